//! Evaluation of the sequential subset: arithmetic, flow, calls.

use fugue::ir::{Operation, ValueType};

use crate::common::{program_with_body, run_entrypoint};

fn write_cast_of(builder: &mut fugue::builder::SemanticBuilder, name: &str) {
    builder.push_parameter_count();
    builder.push_parameter_count();
    builder.push_variable_operand(name).expect("operand");
    builder.count_parameter();
    builder.register_cast(ValueType::String).expect("cast");
    builder.pop_parameter_count();
    builder.count_parameter();
    builder.register_debug_write().expect("debug write");
    builder.pop_parameter_count();
}

#[test]
fn declaration_addition_and_cast_print_eight() {
    let program = program_with_body(|builder| {
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

        write_cast_of(builder, "x");
    });

    assert_eq!(run_entrypoint(&program), "8\n");
}

#[test]
fn precedence_evaluates_multiplication_first() {
    let program = program_with_body(|builder| {
        for (name, value) in [("a", 2), ("b", 3), ("c", 4), ("x", 0)] {
            builder
                .declare_variable(name, ValueType::Integer)
                .expect("declare");
            builder.push_integer_literal(value).expect("literal");
            builder
                .complete_variable_initialization()
                .expect("initialization");
        }

        // x = a + b * c
        builder
            .register_infix_operand_as_lvalue("x")
            .expect("lvalue");
        for (name, operator) in [("a", Some("+")), ("b", Some("*")), ("c", None)] {
            builder.push_variable_operand(name).expect("operand");
            builder.count_parameter();
            builder.register_infix_operand();
            if let Some(operator) = operator {
                builder.push_infix_operator(operator);
            }
        }
        builder.terminate_infix_expression().expect("terminate");
        builder.pop_parameter_count();

        write_cast_of(builder, "x");
    });

    assert_eq!(run_entrypoint(&program), "14\n");
}

#[test]
fn while_loops_observe_their_conditional() {
    let program = program_with_body(|builder| {
        builder
            .declare_variable("x", ValueType::Integer)
            .expect("declare");
        builder.push_integer_literal(3).expect("literal");
        builder
            .complete_variable_initialization()
            .expect("initialization");

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
        builder.enter_block().expect("body");
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
        builder.exit_block().expect("exit");

        write_cast_of(builder, "x");
    });

    assert_eq!(run_entrypoint(&program), "0\n");
}

#[test]
fn elseif_chains_pick_exactly_one_branch() {
    let program = program_with_body(|builder| {
        for (name, value) in [("a", 5), ("out", 0)] {
            builder
                .declare_variable(name, ValueType::Integer)
                .expect("declare");
            builder.push_integer_literal(value).expect("literal");
            builder
                .complete_variable_initialization()
                .expect("initialization");
        }

        let condition = |builder: &mut fugue::builder::SemanticBuilder, operator: &str, rhs: i32| {
            builder.push_parameter_count();
            builder.reset_infix_tracking();
            builder.push_variable_operand("a").expect("a");
            builder.count_parameter();
            builder.register_infix_operand();
            builder.push_infix_operator(operator);
            builder.push_integer_literal(rhs).expect("rhs");
            builder.count_parameter();
            builder.register_infix_operand();
            builder.terminate_infix_expression().expect("terminate");
            builder.pop_parameter_count();
        };
        let assign_out = |builder: &mut fugue::builder::SemanticBuilder, value: i32| {
            builder
                .register_infix_operand_as_lvalue("out")
                .expect("lvalue");
            builder.push_integer_literal(value).expect("value");
            builder.count_parameter();
            builder.register_infix_operand();
            builder.terminate_infix_expression().expect("terminate");
            builder.pop_parameter_count();
        };

        // if(a > 10) { out = 1 } elseif(a == 5) { out = 2 } else { out = 3 }
        builder.register_control("if", false).expect("if");
        condition(builder, ">", 10);
        builder.enter_block().expect("if body");
        assign_out(builder, 1);
        builder.exit_block().expect("if exit");

        builder.register_control("elseif", false).expect("elseif");
        condition(builder, "==", 5);
        builder.enter_block().expect("elseif body");
        assign_out(builder, 2);
        builder.exit_block().expect("elseif exit");

        builder.register_control("else", false).expect("else");
        builder.enter_block().expect("else body");
        assign_out(builder, 3);
        builder.exit_block().expect("else exit");

        write_cast_of(builder, "out");
    });

    assert_eq!(run_entrypoint(&program), "2\n");
}

#[test]
fn function_calls_bind_parameters_and_return_values() {
    let program = program_with_body(|builder| {
        builder.register_function_name("addtwo").expect("name");
        builder
            .register_param("p", ValueType::Integer)
            .expect("param");
        builder.begin_function_returns();
        builder
            .register_function_return("ret", ValueType::Integer, Operation::PushInteger(0))
            .expect("return");
        builder.enter_block_preparse();
        builder.exit_block_preparse().expect("preparse");

        builder.register_function_body("addtwo").expect("body");
        builder.enter_block().expect("entry");
        builder
            .register_infix_operand_as_lvalue("ret")
            .expect("lvalue");
        builder.push_variable_operand("p").expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.push_infix_operator("+");
        builder.push_integer_literal(2).expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.terminate_infix_expression().expect("terminate");
        builder.pop_parameter_count();
        builder.exit_block().expect("exit");

        // integer(y, 0); y is assigned from the call below.
        builder
            .declare_variable("y", ValueType::Integer)
            .expect("declare");
        builder.push_parameter_count();
        builder.push_integer_literal(40).expect("argument");
        builder.count_parameter();
        builder.register_function_call("addtwo").expect("call");
        builder.pop_parameter_count();
        builder
            .complete_variable_initialization()
            .expect("initialization");

        write_cast_of(builder, "y");
    });

    assert_eq!(run_entrypoint(&program), "42\n");
}

#[test]
fn parallel_for_runs_every_index_sequentially() {
    let program = program_with_body(|builder| {
        builder
            .declare_variable("total", ValueType::Integer)
            .expect("declare");
        builder.push_integer_literal(0).expect("literal");
        builder
            .complete_variable_initialization()
            .expect("initialization");

        builder
            .register_control("parallelfor", false)
            .expect("keyword");
        builder.push_parameter_count();
        builder.push_identifier("i").expect("counter");
        builder.count_parameter();
        builder.push_integer_literal(0).expect("lower");
        builder.count_parameter();
        builder.push_integer_literal(5).expect("upper");
        builder.count_parameter();
        builder.push_integer_literal(2).expect("threads");
        builder.count_parameter();
        builder.register_end_of_parallel_for().expect("args");
        builder.enter_block().expect("body");

        // total = total + i
        builder
            .register_infix_operand_as_lvalue("total")
            .expect("lvalue");
        builder.push_variable_operand("total").expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.push_infix_operator("+");
        builder.push_variable_operand("i").expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.terminate_infix_expression().expect("terminate");
        builder.pop_parameter_count();

        builder.exit_block().expect("exit");

        write_cast_of(builder, "total");
    });

    // Counter values 0..5 sum to 10; the thread count is advisory.
    assert_eq!(run_entrypoint(&program), "10\n");
}

#[test]
fn futures_complete_before_any_read() {
    let program = program_with_body(|builder| {
        builder.push_parameter_count();
        builder.push_integer_literal(42).expect("producer");
        builder.count_parameter();
        builder.register_future("f", false).expect("future");
        builder.pop_parameter_count();

        write_cast_of(builder, "f");
    });

    assert_eq!(run_entrypoint(&program), "42\n");
}

#[test]
fn structure_members_read_back_what_was_stored() {
    let program = program_with_body(|builder| {
        builder.register_structure_type("S").expect("open");
        builder
            .register_structure_member("a", ValueType::Integer)
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
        builder.push_integer_literal(7).expect("value");
        builder.count_parameter();
        builder
            .finalize_composite_assignment()
            .expect("finalize");
        builder.pop_parameter_count();

        // integer(x, 0); x = s.a
        builder
            .declare_variable("x", ValueType::Integer)
            .expect("declare");
        builder.push_integer_literal(0).expect("literal");
        builder
            .complete_variable_initialization()
            .expect("initialization");

        builder
            .register_infix_operand_as_lvalue("x")
            .expect("lvalue");
        builder.push_variable_operand("s").expect("operand");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.register_member_access("a");
        builder.terminate_infix_expression().expect("terminate");
        builder.pop_parameter_count();

        write_cast_of(builder, "x");
    });

    assert_eq!(run_entrypoint(&program), "7\n");
}
