use fugue::builder::SemanticBuilder;
use fugue::ir::{Program, ValueType};

/// Builds a program with an entrypoint body assembled by `body`.
pub fn program_with_body(body: impl FnOnce(&mut SemanticBuilder)) -> Program {
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
    body(&mut builder);
    builder.exit_block().expect("body exit");

    let (program, diagnostics) = builder.finish();
    assert!(
        diagnostics.is_empty(),
        "unexpected diagnostics: {diagnostics:?}"
    );
    program
}

/// A program exercising declarations, expressions, flow, structures,
/// loops, and a task.
pub fn rich_program() -> Program {
    program_with_body(|builder| {
        // integer(x, 5); x = x + 3
        builder
            .declare_variable("x", ValueType::Integer)
            .expect("declare");
        builder.push_integer_literal(5).expect("literal");
        builder
            .complete_variable_initialization()
            .expect("initialization");

        builder
            .register_infix_operand_as_lvalue("x")
            .expect("lvalue");
        builder.push_variable_operand("x").expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.push_infix_operator("+");
        builder.push_integer_literal(3).expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.terminate_infix_expression().expect("terminate");
        builder.pop_parameter_count();

        // structure S { integer a, real b }; S s; s.a = 2
        builder.register_structure_type("S").expect("open");
        builder
            .register_structure_member("a", ValueType::Integer)
            .expect("member");
        builder
            .register_structure_member("b", ValueType::Real)
            .expect("member");
        builder.finish_structure_type().expect("close");
        builder
            .declare_structure_variable("s", "S")
            .expect("declare");
        builder.save_lvalue_name("s");
        builder.register_member_lvalue_access("a");
        builder.register_composite_lvalue().expect("root");
        builder.reset_member_access_lvalue().expect("stores");
        builder.push_parameter_count();
        builder.push_integer_literal(2).expect("value");
        builder.count_parameter();
        builder
            .finalize_composite_assignment()
            .expect("finalize");
        builder.pop_parameter_count();

        // if(x > 3) { x = x - 1 } else { x = x * 2 }
        builder.register_control("if", false).expect("if");
        builder.push_parameter_count();
        builder.reset_infix_tracking();
        builder.push_variable_operand("x").expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.push_infix_operator(">");
        builder.push_integer_literal(3).expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.terminate_infix_expression().expect("terminate");
        builder.pop_parameter_count();
        builder.enter_block().expect("if body");
        builder
            .register_infix_operand_as_lvalue("x")
            .expect("lvalue");
        builder.push_variable_operand("x").expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.push_infix_operator("-");
        builder.push_integer_literal(1).expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.terminate_infix_expression().expect("terminate");
        builder.pop_parameter_count();
        builder.exit_block().expect("if exit");
        builder.register_control("else", false).expect("else");
        builder.enter_block().expect("else body");
        builder
            .register_infix_operand_as_lvalue("x")
            .expect("lvalue");
        builder.push_variable_operand("x").expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.push_infix_operator("*");
        builder.push_integer_literal(2).expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.terminate_infix_expression().expect("terminate");
        builder.pop_parameter_count();
        builder.exit_block().expect("else exit");

        // while(x > 0) { x = x - 1 }
        builder.register_control("while", false).expect("while");
        builder.push_parameter_count();
        builder.reset_infix_tracking();
        builder.push_variable_operand("x").expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.push_infix_operator(">");
        builder.push_integer_literal(0).expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.terminate_infix_expression().expect("terminate");
        builder
            .register_end_of_while_loop_conditional()
            .expect("conditional");
        builder.enter_block().expect("loop body");
        builder
            .register_infix_operand_as_lvalue("x")
            .expect("lvalue");
        builder.push_variable_operand("x").expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.push_infix_operator("-");
        builder.push_integer_literal(1).expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.terminate_infix_expression().expect("terminate");
        builder.pop_parameter_count();
        builder.exit_block().expect("loop exit");

        // future(f, 42)
        builder.push_parameter_count();
        builder.push_integer_literal(42).expect("producer");
        builder.count_parameter();
        builder.register_future("f", true).expect("future");
        builder.pop_parameter_count();

        // task("worker") { sendmessage-by-name(beat) }
        builder.push_parameter_count();
        builder.push_string_literal("worker").expect("name");
        builder.count_parameter();
        builder.register_task().expect("task");
        builder.enter_block().expect("task body");
        builder.push_parameter_count();
        builder.register_send_message(true, "beat").expect("send");
        builder.pop_parameter_count();
        builder.exit_block().expect("task exit");
        builder.pop_parameter_count();
    })
}
