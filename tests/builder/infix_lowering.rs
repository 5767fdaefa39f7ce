//! Precedence, chained assignment, compound assignment, and the
//! increment forms.

use fugue::ir::{ArithmeticKind, Operation, ValueType};

use crate::common::{builder_with_entrypoint, declare_integer, entrypoint_body, finish_entrypoint};

#[test]
fn multiplication_binds_tighter_than_addition() {
    let mut builder = builder_with_entrypoint();
    declare_integer(&mut builder, "a", 1);
    declare_integer(&mut builder, "b", 2);
    declare_integer(&mut builder, "c", 3);
    declare_integer(&mut builder, "x", 0);

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

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    let tail = &ops[ops.len() - 6..];

    // b * c combines first; the sum applies to (a, b*c).
    assert!(matches!(
        tail[0].push_source(),
        Some(Operation::GetVariableValue(_))
    ));
    assert!(matches!(
        tail[1].push_source(),
        Some(Operation::GetVariableValue(_))
    ));
    assert!(matches!(
        tail[2].push_source(),
        Some(Operation::GetVariableValue(_))
    ));
    assert!(matches!(
        tail[3].push_source(),
        Some(Operation::Arithmetic {
            kind: ArithmeticKind::Multiply,
            ..
        })
    ));
    assert!(matches!(
        tail[4].push_source(),
        Some(Operation::Arithmetic {
            kind: ArithmeticKind::Sum,
            ..
        })
    ));
    assert!(matches!(tail[5], Operation::AssignValue(_)));
}

#[test]
fn boolean_operands_lower_to_a_short_circuit_compound() {
    let mut builder = builder_with_entrypoint();
    builder
        .declare_variable("p", ValueType::Boolean)
        .expect("declare");
    builder.push_boolean_literal(true).expect("default");
    builder
        .complete_variable_initialization()
        .expect("initialization");
    builder
        .declare_variable("q", ValueType::Boolean)
        .expect("declare");
    builder.push_boolean_literal(false).expect("default");
    builder
        .complete_variable_initialization()
        .expect("initialization");
    builder
        .declare_variable("r", ValueType::Boolean)
        .expect("declare");
    builder.push_boolean_literal(false).expect("default");
    builder
        .complete_variable_initialization()
        .expect("initialization");

    // r = p & q
    crate::common::assign_binary(&mut builder, "r", "p", "&", "q");

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    let compound = ops
        .iter()
        .find_map(|op| match op.push_source() {
            Some(Operation::LogicalAnd { operations }) => Some(operations),
            _ => None,
        })
        .expect("a LogicalAnd owns the operand pushes");

    // The compound owns both operand pushes; they were removed from the
    // block stream so nothing evaluates twice.
    assert_eq!(compound.len(), 2);
    assert!(!ops
        .iter()
        .any(|op| matches!(op.push_source(), Some(Operation::GetVariableValue(_)))));
}

#[test]
fn integer_operands_lower_to_a_bitwise_compound() {
    let mut builder = builder_with_entrypoint();
    declare_integer(&mut builder, "a", 6);
    declare_integer(&mut builder, "b", 3);
    declare_integer(&mut builder, "x", 0);

    crate::common::assign_binary(&mut builder, "x", "a", "&", "b");

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    assert!(ops.iter().any(|op| matches!(
        op.push_source(),
        Some(Operation::BitwiseAnd {
            operand_type: ValueType::Integer,
            ..
        })
    )));
}

#[test]
fn chained_assignment_reads_the_previous_target() {
    let mut builder = builder_with_entrypoint();
    declare_integer(&mut builder, "a", 0);
    declare_integer(&mut builder, "b", 0);

    // a = b = 5
    builder
        .register_infix_operand_as_lvalue("a")
        .expect("outer lvalue");
    builder
        .register_infix_operand_as_lvalue("b")
        .expect("inner lvalue");
    builder.push_integer_literal(5).expect("value");
    builder.count_parameter();
    builder.register_infix_operand();
    builder.terminate_infix_expression().expect("terminate");
    builder.pop_parameter_count();
    builder.pop_parameter_count();

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    let tail = &ops[ops.len() - 4..];
    assert!(matches!(tail[0], Operation::PushInteger(5)));
    assert!(matches!(tail[1], Operation::AssignValue(_)));
    assert!(matches!(
        tail[2].push_source(),
        Some(Operation::GetVariableValue(_))
    ));
    assert!(matches!(tail[3], Operation::AssignValue(_)));
}

#[test]
fn compound_assignment_reads_swaps_applies_and_stores() {
    let mut builder = builder_with_entrypoint();
    declare_integer(&mut builder, "x", 1);

    // x += 3
    builder.push_identifier("x").expect("target");
    builder.register_op_assignment_operator("+=");
    builder.push_integer_literal(3).expect("value");
    builder.count_parameter();
    builder.register_infix_operand();
    builder.terminate_infix_expression().expect("terminate");
    builder.register_op_assignment().expect("apply");
    builder.pop_parameter_count();

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    let tail = &ops[ops.len() - 4..];
    assert!(matches!(
        tail[0].push_source(),
        Some(Operation::GetVariableValue(_))
    ));
    assert!(matches!(tail[1], Operation::PushInteger(3)));
    assert!(matches!(
        tail[2].push_source(),
        Some(Operation::Arithmetic {
            kind: ArithmeticKind::Sum,
            ..
        })
    ));
    assert!(matches!(tail[3], Operation::AssignValue(_)));
}

#[test]
fn concat_assignment_requires_strings() {
    let mut builder = builder_with_entrypoint();
    builder
        .declare_variable("s", ValueType::String)
        .expect("declare");
    builder.push_string_literal("seed").expect("default");
    builder
        .complete_variable_initialization()
        .expect("initialization");

    builder.push_identifier("s").expect("target");
    builder.register_op_assignment_operator(".=");
    builder.push_string_literal("tail").expect("value");
    builder.count_parameter();
    builder.register_infix_operand();
    builder.terminate_infix_expression().expect("terminate");
    builder.register_op_assignment().expect("apply");
    builder.pop_parameter_count();

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    assert!(ops.iter().any(|op| matches!(
        op.push_source(),
        Some(Operation::Concatenate {
            operand_count: 2,
            ..
        })
    )));
}

#[test]
fn preincrement_lands_immediately_postincrement_at_the_boundary() {
    let mut builder = builder_with_entrypoint();
    declare_integer(&mut builder, "x", 0);

    builder.save_incdec_name("x");
    builder.preincrement_variable().expect("preincrement");

    builder.save_incdec_name("x");
    builder.postincrement_variable().expect("postincrement");

    // Nothing from the postincrement lands until the boundary merge.
    builder.merge_deferred_operations().expect("merge");

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    // Declaration (3 ops) + two increment sequences of 4 ops each.
    assert_eq!(ops.len(), 11);
    assert!(matches!(ops[3].push_source(), Some(Operation::GetVariableValue(_))));
    assert!(matches!(ops[6], Operation::AssignValue(_)));
    assert!(matches!(ops[7].push_source(), Some(Operation::GetVariableValue(_))));
    assert!(matches!(ops[10], Operation::AssignValue(_)));
}

#[test]
fn user_defined_infix_functions_join_the_operator_table() {
    let mut builder = builder_with_entrypoint();
    declare_integer(&mut builder, "a", 2);
    declare_integer(&mut builder, "b", 5);
    declare_integer(&mut builder, "x", 0);

    // Preparse an infix function: max(p, q) -> integer
    builder.register_user_defined_infix();
    builder.register_function_name("max").expect("name");
    builder
        .register_param("p", ValueType::Integer)
        .expect("param p");
    builder
        .register_param("q", ValueType::Integer)
        .expect("param q");
    builder.begin_function_returns();
    builder
        .register_function_return("ret", ValueType::Integer, Operation::PushInteger(0))
        .expect("return");
    builder.enter_block_preparse();
    builder.exit_block_preparse().expect("preparse");

    // x = a max b
    crate::common::assign_binary(&mut builder, "x", "a", "max", "b");

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    assert!(ops
        .iter()
        .any(|op| matches!(op.push_source(), Some(Operation::Invoke { .. }))));
}
