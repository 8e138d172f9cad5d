use crate::language::{
    ast::{AstNode, NodeType},
    compiler::functions::FunctionManager,
};
use crate::runtime::xvalue::Xvalue;
use std::fmt;

/// Static result shape of an expression node. `Any` covers nodes whose
/// shape is only known per record (oosvar reads, UDF calls).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Map,
    Any,
}

pub fn infer_shape(node: &AstNode, functions: &FunctionManager) -> Shape {
    match node.node_type {
        NodeType::StringLiteral
        | NodeType::RegexCaseInsensitive
        | NodeType::NumericLiteral
        | NodeType::BooleanLiteral
        | NodeType::ContextVariable
        | NodeType::EnvironmentVariable
        | NodeType::Operator
        | NodeType::FieldName
        | NodeType::IndirectFieldName
        | NodeType::PositionalFieldName
        | NodeType::PositionalFieldValue => Shape::Scalar,

        NodeType::FullSrec | NodeType::MapLiteral | NodeType::FullOosvar => Shape::Map,

        NodeType::OosvarName
        | NodeType::IndirectOosvarName
        | NodeType::LocalVariable
        | NodeType::IndexedValue => Shape::Any,

        NodeType::FunctionCallsite => functions
            .builtin_shape(&node.text, node.children().len())
            .unwrap_or(Shape::Any),

        _ => Shape::Any,
    }
}

/// Declared type of a local, parameter or function return value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclaredType {
    Any,
    Str,
    Num,
    Int,
    Float,
    Bool,
    Map,
}

impl DeclaredType {
    pub fn from_name(name: &str) -> Option<Self> {
        let declared = match name {
            "var" | "any" => DeclaredType::Any,
            "str" => DeclaredType::Str,
            "num" => DeclaredType::Num,
            "int" => DeclaredType::Int,
            "float" => DeclaredType::Float,
            "bool" => DeclaredType::Bool,
            "map" => DeclaredType::Map,
            _ => return None,
        };
        Some(declared)
    }

    /// Absent is accepted by every type so that unset values flow through.
    pub fn accepts(self, value: &Xvalue) -> bool {
        if value.is_absent() {
            return true;
        }
        match (self, value) {
            (DeclaredType::Any, _) => true,
            (DeclaredType::Map, value) => value.is_map(),
            (_, Xvalue::Map(_)) => false,
            (declared, Xvalue::Terminal(scalar)) => match declared {
                DeclaredType::Str => matches!(scalar.type_name(), "string" | "empty"),
                DeclaredType::Num => matches!(scalar.type_name(), "int" | "float"),
                DeclaredType::Int => scalar.type_name() == "int",
                DeclaredType::Float => scalar.type_name() == "float",
                DeclaredType::Bool => scalar.type_name() == "boolean",
                DeclaredType::Any | DeclaredType::Map => true,
            },
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeclaredType::Any => "var",
            DeclaredType::Str => "str",
            DeclaredType::Num => "num",
            DeclaredType::Int => "int",
            DeclaredType::Float => "float",
            DeclaredType::Bool => "bool",
            DeclaredType::Map => "map",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse_program;
    use crate::runtime::{builtins::BuiltinRegistry, value::Mlrval};

    fn rhs_shape(source: &str) -> Shape {
        let registry = BuiltinRegistry::standard();
        let functions = FunctionManager::new(&registry);
        let ast = parse_program(source).expect("parse");
        infer_shape(&ast.children()[0].children()[1], &functions)
    }

    #[test]
    fn shapes_by_node_kind() {
        assert_eq!(rhs_shape("$y = $x + 1"), Shape::Scalar);
        assert_eq!(rhs_shape("@y = $*"), Shape::Map);
        assert_eq!(rhs_shape("@y = {\"a\": 1}"), Shape::Map);
        assert_eq!(rhs_shape("@y = @x[1]"), Shape::Any);
        assert_eq!(rhs_shape("@y = @*"), Shape::Map);
    }

    #[test]
    fn calls_use_registered_shapes() {
        assert_eq!(rhs_shape("@y = mapsum({}, {})"), Shape::Map);
        assert_eq!(rhs_shape("@y = strlen($x)"), Shape::Scalar);
        assert_eq!(rhs_shape("@y = asserting_map({})"), Shape::Any);
        assert_eq!(rhs_shape("@y = my_udf(1)"), Shape::Any);
    }

    #[test]
    fn declared_types_accept_absent() {
        let absent = Xvalue::Terminal(Mlrval::Absent);
        for name in ["var", "str", "num", "int", "float", "bool", "map"] {
            let declared = DeclaredType::from_name(name).expect("known type");
            assert!(declared.accepts(&absent), "{name}");
        }
        assert!(DeclaredType::Num.accepts(&Xvalue::Terminal(Mlrval::Float(1.5))));
        assert!(!DeclaredType::Int.accepts(&Xvalue::Terminal(Mlrval::Float(1.5))));
        assert!(!DeclaredType::Str.accepts(&Xvalue::empty_map()));
        assert!(DeclaredType::from_name("list").is_none());
    }
}
