use fugue::builder::SemanticBuilder;
use fugue::ir::{Block, FunctionKind, Program, ValueType};

/// Builds the preparse shell of an entrypoint function and opens its
/// body for the main parse.
pub fn builder_with_entrypoint() -> SemanticBuilder {
    let mut builder = SemanticBuilder::new();
    builder
        .register_function_name("entrypoint")
        .expect("function name");
    builder.enter_block_preparse();
    builder.exit_block_preparse().expect("preparse exit");

    builder
        .register_function_body("entrypoint")
        .expect("function body");
    builder.enter_block().expect("body entry");
    builder
}

/// Closes the entrypoint body and returns the finished program.
pub fn finish_entrypoint(mut builder: SemanticBuilder) -> Program {
    builder.exit_block().expect("body exit");
    let (program, _) = builder.finish();
    program
}

/// The entrypoint's body block.
pub fn entrypoint_body(program: &Program) -> &Block {
    let name = program
        .strings
        .lookup("entrypoint")
        .expect("entrypoint was interned");
    let function = program
        .scopes
        .function_id(program.global_scope, name)
        .expect("entrypoint is declared");
    match program.functions.get(function) {
        Some(FunctionKind::User(function)) => {
            function.body.as_ref().expect("entrypoint has a body")
        }
        _ => panic!("entrypoint is not a user function"),
    }
}

/// Declares an integer variable with an initial value.
pub fn declare_integer(builder: &mut SemanticBuilder, name: &str, value: i32) {
    builder
        .declare_variable(name, ValueType::Integer)
        .expect("declare");
    builder.push_integer_literal(value).expect("initial value");
    builder
        .complete_variable_initialization()
        .expect("initialization");
}

/// Drives one `target = lhs <operator> rhs` statement through the infix
/// machinery, with both operands read from variables.
pub fn assign_binary(
    builder: &mut SemanticBuilder,
    target: &str,
    lhs: &str,
    operator: &str,
    rhs: &str,
) {
    builder
        .register_infix_operand_as_lvalue(target)
        .expect("lvalue");
    builder.push_variable_operand(lhs).expect("lhs");
    builder.count_parameter();
    builder.register_infix_operand();
    builder.push_infix_operator(operator);
    builder.push_variable_operand(rhs).expect("rhs");
    builder.count_parameter();
    builder.register_infix_operand();
    builder
        .terminate_infix_expression()
        .expect("terminate infix");
    builder.pop_parameter_count();
}
