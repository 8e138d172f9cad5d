use mlr_dsl::{
    cli::{self, Command, Invocation},
    config,
    diagnostics::{emit_compile_error, emit_syntax_errors, report_runtime_error},
    language::{
        compiler::{compile, CompileOptions},
        parser::parse_program,
    },
    runtime::{
        builtins::BuiltinRegistry,
        interpreter::{Input, RunSettings},
        Interpreter,
    },
};
use indexmap::IndexSet;
use std::{
    env,
    fs::File,
    io::{self, BufReader},
    process,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_env("MLR_DSL_LOG"))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = config::load(&args).and_then(|main| cli::parse_args(&args, main));
    match command {
        Ok(Command::Help) => print!("{}", cli::USAGE),
        Ok(Command::Version) => println!("mlr-dsl {}", env!("CARGO_PKG_VERSION")),
        Ok(Command::FunctionHelp(names)) => process::exit(function_help(&names)),
        Ok(Command::ListFunctions) => list_functions(),
        Ok(Command::Run(invocation)) => process::exit(run(*invocation)),
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    }
}

fn function_help(names: &[String]) -> i32 {
    let registry = BuiltinRegistry::standard();
    let mut status = 0;
    for name in names {
        match registry.usage(name) {
            Some(usage) => println!("{usage}"),
            None => {
                eprintln!("mlr: function name \"{name}\" not found.");
                status = 1;
            }
        }
    }
    status
}

/// One line per name, in registration order.
fn list_functions() {
    let registry = BuiltinRegistry::standard();
    let names: IndexSet<&str> = registry.iter().map(|info| info.name).collect();
    for name in names {
        println!("{name}");
    }
}

fn run(invocation: Invocation) -> i32 {
    let ast = match parse_program(&invocation.expression) {
        Ok(ast) => ast,
        Err(errors) => {
            emit_syntax_errors(&invocation.expression, &errors);
            return 1;
        }
    };
    if invocation.print_ast {
        println!("DSL EXPRESSION:\n{}", invocation.expression);
        println!("AST:\n{}", ast.print_tree());
    }

    let registry = BuiltinRegistry::standard();
    let options = CompileOptions { verb: invocation.verb };
    let program = match compile(&ast, &registry, &options) {
        Ok(program) => program,
        Err(err) => {
            emit_compile_error(&invocation.expression, &err);
            return 1;
        }
    };

    let settings = RunSettings {
        verb: invocation.verb,
        invert: invocation.invert,
        quiet: invocation.quiet,
        infer_types: invocation.infer_types,
    };
    let mut interpreter = Interpreter::new(program, invocation.main.io, settings);
    for (name, value) in &invocation.presets {
        interpreter.preset(name, value);
    }

    let inputs = match open_inputs(&invocation.files, invocation.main.no_input) {
        Ok(inputs) => inputs,
        Err((path, err)) => {
            eprintln!("mlr: open \"{path}\": {err}");
            return 1;
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match interpreter.run(inputs, &mut out) {
        Ok(()) => 0,
        Err(err) => {
            report_runtime_error(&err);
            1
        }
    }
}

fn open_inputs(files: &[String], no_input: bool) -> Result<Vec<Input>, (String, io::Error)> {
    if no_input {
        return Ok(Vec::new());
    }
    if files.is_empty() {
        return Ok(vec![Input {
            filename: "(stdin)".to_string(),
            reader: Box::new(BufReader::new(io::stdin())),
        }]);
    }
    files
        .iter()
        .map(|path| {
            let file = File::open(path).map_err(|err| (path.clone(), err))?;
            Ok(Input {
                filename: path.clone(),
                reader: Box::new(BufReader::new(file)),
            })
        })
        .collect()
}
