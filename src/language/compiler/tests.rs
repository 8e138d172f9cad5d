use super::output::{emit_records, EmitKind};
use super::*;
use crate::io::IoOptions;
use crate::language::parser::parse_program;
use crate::runtime::{
    interpreter::{Input, RunSettings},
    xvalue::{Level, MapKey},
    Interpreter,
};
use std::io::Cursor;

fn compile_with(source: &str, verb: Verb) -> Result<Program, CompileError> {
    let ast = parse_program(source).expect("parse");
    compile(&ast, &BuiltinRegistry::standard(), &CompileOptions { verb })
}

fn compile_error(source: &str) -> CompileError {
    match compile_with(source, Verb::Put) {
        Ok(_) => panic!("expected a compile error for {source:?}"),
        Err(err) => err,
    }
}

fn run_with(source: &str, settings: RunSettings, input: &str) -> String {
    let program = compile_with(source, settings.verb).expect("compile");
    let mut interpreter = Interpreter::new(program, IoOptions::default(), settings);
    let inputs = vec![Input {
        filename: "(test)".to_string(),
        reader: Box::new(Cursor::new(input.to_string())),
    }];
    let mut out = Vec::new();
    interpreter.run(inputs, &mut out).expect("run");
    String::from_utf8(out).expect("utf-8")
}

fn put(source: &str, input: &str) -> String {
    run_with(source, RunSettings::default(), input)
}

fn put_quiet(source: &str, input: &str) -> String {
    let settings = RunSettings {
        quiet: true,
        ..RunSettings::default()
    };
    run_with(source, settings, input)
}

fn terminal(value: i64) -> Xvalue {
    Xvalue::Terminal(Mlrval::Int(value))
}

fn map(entries: &[(&str, Xvalue)]) -> Xvalue {
    Xvalue::Map(entries.iter().map(|(k, v)| (MapKey::from(*k), v.clone())).collect())
}

fn render(records: &[Level]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            crate::io::reader::flatten_to_record(&Xvalue::Map(record.clone()), ":", &Default::default())
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect()
}

mod functions {
    use super::*;

    #[test]
    fn forward_references_resolve_after_the_definition() {
        let out = put("$y = double($x); func double(n) { return n * 2 }", "x=3\n");
        assert_eq!(out, "x=3,y=6\n");
    }

    #[test]
    fn recursion_and_local_frames() {
        let source = "func fact(n) { if (n <= 1) { return 1 } return n * fact(n - 1) } $f = fact($x)";
        assert_eq!(put(source, "x=5\n"), "x=5,f=120\n");
    }

    #[test]
    fn unknown_function_is_reported() {
        let err = compile_error("$y = nosuch($x)");
        assert_eq!(err.to_string(), "mlr: function name \"nosuch\" not found");
        assert_eq!(err.label(), "not defined");
    }

    #[test]
    fn unknown_subroutine_is_reported() {
        let err = compile_error("call nosuch(1)");
        assert_eq!(err.to_string(), "mlr: subroutine name \"nosuch\" not found");
    }

    #[test]
    fn builtin_arity_is_checked_at_compile_time() {
        let err = compile_error("$y = strlen($x, $z)");
        assert_eq!(err.to_string(), "mlr: function named \"strlen\" takes 1 argument; got 2");
    }

    #[test]
    fn forward_reference_arity_is_checked_at_resolution() {
        let err = compile_error("$y = f(1, 2); func f(a) { return a }");
        assert_eq!(err.to_string(), "mlr: function named \"f\" takes 1 argument; got 2");
    }

    #[test]
    fn builtins_cannot_be_redefined() {
        let err = compile_error("func strlen(s) { return 1 }");
        assert!(matches!(err, CompileError::BuiltinOverride { ref name, .. } if name == "strlen"));
    }

    #[test]
    fn duplicate_definitions_are_rejected() {
        assert!(matches!(
            compile_error("func f() { return 1 } func f() { return 2 }"),
            CompileError::DuplicateFunction { .. }
        ));
        assert!(matches!(
            compile_error("subr s() { } subr s() { }"),
            CompileError::DuplicateSubroutine { .. }
        ));
    }

    #[test]
    fn subroutines_run_for_side_effects() {
        let out = put("call scale($x); $t = @total; subr scale(n) { @total = n * 10 }", "x=3\n");
        assert_eq!(out, "x=3,t=30\n");
    }

    #[test]
    fn map_valued_functions_feed_map_builtins() {
        let source = "func extra(): map { return {\"b\": 2} } $* = mapsum($*, extra())";
        assert_eq!(put(source, "a=1\n"), "a=1,b=2\n");
    }

    #[test]
    fn return_type_is_enforced() {
        let program = compile_with("func f(): int { return \"x\" } $y = f()", Verb::Put).expect("compile");
        let mut interpreter = Interpreter::new(program, IoOptions::default(), RunSettings::default());
        let record = crate::io::reader::parse_dkvp_line("a=1", ",", "=");
        assert!(interpreter
            .process_record(record, crate::runtime::state::Context::default())
            .is_err());
    }
}

mod placement {
    use super::*;

    fn misplaced(source: &str) -> String {
        match compile_error(source) {
            CompileError::Misplaced { message, .. } => message,
            other => panic!("expected a placement error, got {other}"),
        }
    }

    #[test]
    fn field_assignments_are_not_allowed_in_begin_or_end() {
        assert_eq!(
            misplaced("begin { $x = 1 }"),
            "assignments to $-variables are not valid within begin or end blocks"
        );
        assert_eq!(
            misplaced("end { unset $x }"),
            "assignments to $-variables are not valid within begin or end blocks"
        );
    }

    #[test]
    fn positional_writes_need_a_record() {
        assert_eq!(
            misplaced("begin { $[[1]] = \"x\" }"),
            "assignments to $-variables are not valid within begin or end blocks"
        );
        assert_eq!(
            misplaced("end { unset $[[[1]]] }"),
            "assignments to $-variables are not valid within begin or end blocks"
        );
    }

    #[test]
    fn loop_control_needs_a_loop() {
        assert_eq!(misplaced("break"), "break statements are only valid within for/do/while loops");
        assert_eq!(misplaced("if (true) { continue }"), "continue statements are only valid within for/do/while loops");
        assert!(compile_with("while (true) { break }", Verb::Put).is_ok());
    }

    #[test]
    fn return_rules_depend_on_the_enclosing_block() {
        assert!(misplaced("return 1").contains("only valid within func/subr blocks"));
        assert_eq!(
            misplaced("func f() { return }"),
            "return statements in func blocks must return a value"
        );
        assert!(misplaced("subr s() { return 1 }").contains("subr"));
    }

    #[test]
    fn definitions_are_top_level_only() {
        assert!(misplaced("if (true) { begin { @x = 1 } }").contains("top level"));
    }

    #[test]
    fn filter_keyword_is_rejected_inside_the_filter_verb() {
        match compile_with("filter $x > 1", Verb::Filter) {
            Err(CompileError::Misplaced { message, .. }) => assert!(message.contains("filter")),
            _ => panic!("expected a placement error"),
        }
        assert!(compile_with("filter $x > 1", Verb::Put).is_ok());
    }
}

mod evaluation {
    use super::*;

    #[test]
    fn logical_operators_short_circuit() {
        let out = put("$a = true || asserting_int(\"no\"); $b = false && asserting_int(\"no\")", "x=1\n");
        assert_eq!(out, "x=1,a=true,b=false\n");
    }

    #[test]
    fn regex_captures_interpolate_into_later_strings() {
        let source = r#"if ($x =~ "^(a)(b)") { $y = "\2\1" } else { $y = "none" }"#;
        assert_eq!(put(source, "x=abc\nx=zzz\n"), "x=abc,y=ba\nx=zzz,y=none\n");
    }

    #[test]
    fn absent_operands_are_neutral() {
        assert_eq!(put("$y = $nosuch + 1; $z = $nosuch . \"s\"", "x=1\n"), "x=1,y=1,z=s\n");
    }

    #[test]
    fn absent_assignments_are_skipped() {
        assert_eq!(put("$y = $nosuch; @v = $nosuch; $z = is_absent(@v)", "x=1\n"), "x=1,z=true\n");
    }

    #[test]
    fn indexing_reads_nested_storage_and_fresh_values() {
        let source = "@m[$k][1] = $v; $got = @m[$k][1]; $n = splitnv(\"a,b,c\", \",\")[2]";
        assert_eq!(put(source, "k=p,v=7\n"), "k=p,v=7,got=7,n=b\n");
    }

    #[test]
    fn map_builtins_take_field_maps() {
        let out = put("$* = mapexcept($*, \"b\"); $n = length($*)", "a=1,b=2,c=3\n");
        assert_eq!(out, "a=1,c=3,n=2\n");
    }

    #[test]
    fn dot_operators_keep_integers() {
        let source = "$y = $a .+ 3; $z = $a .* 2; $w = 7 ./ 2; $n = .- $a; $big = 9223372036854775807 .+ 1";
        assert_eq!(
            put(source, "a=1\n"),
            "a=1,y=4,z=2,w=3,n=-1,big=-9223372036854775808\n"
        );
    }

    #[test]
    fn negative_literals_are_scanned_whole() {
        assert_eq!(put("$m = -9223372036854775808 % -1", "a=1\n"), "a=1,m=0\n");
        assert_eq!(put("$p = -2 ** 2", "a=1\n"), "a=1,p=-4\n");
    }

    #[test]
    fn time_functions_run_in_expressions() {
        let source = "$t = sec2gmt($s); $d = sec2dhms($s + 500000); $back = gmt2sec($t)";
        assert_eq!(
            put(source, "s=0\n"),
            "s=0,t=1970-01-01T00:00:00Z,d=5d18h53m20s,back=0\n"
        );
    }

    #[test]
    fn typed_locals_reject_mismatched_values() {
        let program = compile_with("int n = \"text\"", Verb::Put).expect("compile");
        let mut interpreter = Interpreter::new(program, IoOptions::default(), RunSettings::default());
        let record = crate::io::reader::parse_dkvp_line("a=1", ",", "=");
        assert!(interpreter
            .process_record(record, crate::runtime::state::Context::default())
            .is_err());
    }
}

mod statements {
    use super::*;

    #[test]
    fn inner_scopes_shadow_and_assign_outward() {
        let source = "var x = 1; var y = 1; if (true) { var x = 2; y = 5; $inner = x } $outer = x; $y = y";
        assert_eq!(put(source, "a=0\n"), "a=0,inner=2,outer=1,y=5\n");
    }

    #[test]
    fn key_value_loops_walk_the_record() {
        let source = "var s = 0; for (k, v in $*) { s += v } $sum = s";
        assert_eq!(put(source, "a=1,b=2\n"), "a=1,b=2,sum=3\n");
    }

    #[test]
    fn multi_key_loops_bind_each_level() {
        let source = "@m[1][2] = 3; for ((k1, k2), v in @m) { $out = k1 . \":\" . k2 . \"=\" . v }";
        assert_eq!(put(source, "a=0\n"), "a=0,out=1:2=3\n");
    }

    #[test]
    fn triple_for_loops_scope_their_counter() {
        let source = "for (int i = 0; i < 3; i += 1) { $last = i } $after = is_absent(i)";
        assert_eq!(put(source, "a=0\n"), "a=0,last=2,after=true\n");
    }

    #[test]
    fn while_and_do_while_honor_break_and_continue() {
        let source = "var n = 0; while (true) { n += 1; if (n < 3) { continue } break } $n = n; \
                      var m = 10; do { m += 1 } while (false); $m = m";
        assert_eq!(put(source, "a=0\n"), "a=0,n=3,m=11\n");
    }

    #[test]
    fn unset_removes_fields_and_oosvars() {
        assert_eq!(put("unset $a", "a=1,b=2\n"), "b=2\n");
        assert_eq!(put("@x = 1; unset @x; $gone = is_absent(@x)", "a=1\n"), "a=1,gone=true\n");
    }

    #[test]
    fn positional_names_read_rename_and_assign() {
        let source = "$[[1]] = \"A\"; $[[[2]]] = 9; $n = $[[2]]; $v = $[[[1]]]";
        assert_eq!(put(source, "a=1,b=2\n"), "A=1,b=9,n=b,v=1\n");
        let source = "$[[5]] = \"x\"; $[[[5]]] = 1; $gone = is_absent($[[5]])";
        assert_eq!(put(source, "a=1\n"), "a=1,gone=true\n");
    }

    #[test]
    fn positional_names_can_be_unset() {
        assert_eq!(put("unset $[[1]]", "a=1,b=2\n"), "b=2\n");
        assert_eq!(put("unset $[[[2]]]", "a=1,b=2\n"), "a=1\n");
        assert_eq!(put("unset $[[3]]", "a=1,b=2\n"), "a=1,b=2\n");
    }

    #[test]
    fn positional_writes_need_an_integer_index() {
        let program = compile_with("$[[\"x\"]] = \"y\"", Verb::Put).expect("compile");
        let mut interpreter = Interpreter::new(program, IoOptions::default(), RunSettings::default());
        let record = crate::io::reader::parse_dkvp_line("a=1", ",", "=");
        let Err(err) = interpreter.process_record(record, crate::runtime::state::Context::default()) else {
            panic!("expected a runtime error");
        };
        assert_eq!(err.to_string(), "mlr: positional names must be integers; got \"x\".");
    }

    #[test]
    fn pattern_actions_guard_their_block() {
        assert_eq!(put("$x > 1 { $big = true }", "x=1\nx=2\n"), "x=1\nx=2,big=true\n");
    }

    #[test]
    fn filter_statement_in_put_drops_records() {
        assert_eq!(put("filter $x != 2", "x=1\nx=2\nx=3\n"), "x=1\nx=3\n");
    }
}

mod emit {
    use super::*;

    const INPUT: &str = "a=pan,b=x,x=1\na=eks,b=y,x=2\n";
    const ACCUMULATE: &str = "@sum[$a][$b] = $x; @count[$a] = 1; ";

    #[test]
    fn emit_splits_by_index_names() {
        let out = put_quiet(&format!("{ACCUMULATE} end {{ emit @sum, \"a\" }}"), INPUT);
        assert_eq!(out, "a=pan,x=1\na=eks,y=2\n");
    }

    #[test]
    fn emitp_prefixes_with_the_path() {
        let out = put_quiet(&format!("{ACCUMULATE} end {{ emitp @sum, \"a\" }}"), INPUT);
        assert_eq!(out, "a=pan,sum:pan:x=1\na=eks,sum:eks:y=2\n");
        let out = put_quiet(&format!("{ACCUMULATE} end {{ emitp @sum }}"), INPUT);
        assert_eq!(out, "sum:pan:x=1,sum:eks:y=2\n");
    }

    #[test]
    fn lashed_emits_line_up_parallel_maps() {
        let out = put_quiet(&format!("{ACCUMULATE} end {{ emit (@sum, @count), \"a\" }}"), INPUT);
        assert_eq!(out, "a=pan,x=1,count=1\na=eks,y=2,count=1\n");
    }

    #[test]
    fn non_map_emittables_emit_nothing_when_indexed() {
        assert_eq!(put_quiet("@n = 3; end { emit @n, \"a\" }", "x=1\n"), "");
        assert_eq!(put_quiet("@n = 3; end { emit @n }", "x=1\n"), "n=3\n");
    }

    #[test]
    fn emitf_places_each_value_under_its_name() {
        let out = put_quiet("@c += 1; @s += $x; end { emitf @c, @s }", "x=4\nx=5\n");
        assert_eq!(out, "c=2,s=9\n");
    }

    #[test]
    fn emit_records_without_indices_merge_maps() {
        let sum = map(&[("pan", map(&[("x", terminal(1))])), ("eks", map(&[("y", terminal(2))]))]);
        let records = emit_records(EmitKind::Emit, vec![(Some("sum".into()), sum.clone())], &[], ":");
        assert_eq!(render(&records), ["pan:x=1,eks:y=2"]);
        let records = emit_records(EmitKind::EmitP, vec![(Some("sum".into()), sum)], &[], ":");
        assert_eq!(render(&records), ["sum:pan:x=1,sum:eks:y=2"]);
    }

    #[test]
    fn emit_records_recurse_through_several_indices() {
        let sum = map(&[(
            "pan",
            map(&[("x", map(&[("v", terminal(1))])), ("y", map(&[("v", terminal(2))]))]),
        )]);
        let names = ["a".to_string(), "b".to_string()];
        let records = emit_records(EmitKind::Emit, vec![(Some("sum".into()), sum.clone())], &names, ":");
        assert_eq!(render(&records), ["a=pan,b=x,v=1", "a=pan,b=y,v=2"]);
        let records = emit_records(EmitKind::EmitP, vec![(Some("sum".into()), sum)], &names, ":");
        assert_eq!(render(&records), ["a=pan,b=x,sum:pan:x:v=1", "a=pan,b=y,sum:pan:y:v=2"]);
    }

    #[test]
    fn emit_records_skip_absent_values() {
        let records = emit_records(
            EmitKind::Emit,
            vec![(Some("n".into()), Xvalue::Terminal(Mlrval::Absent))],
            &[],
            ":",
        );
        assert_eq!(render(&records), [""]);
    }
}
