//! Soft-failure discipline: fatal flag, diagnostics, and NoOp emission.

use fugue::ir::{Operation, ValueType};

use crate::common::{builder_with_entrypoint, declare_integer, entrypoint_body, finish_entrypoint};

#[test]
fn mixed_operand_types_bail_out_with_a_diagnostic() {
    let mut builder = builder_with_entrypoint();
    declare_integer(&mut builder, "n", 1);
    builder
        .declare_variable("s", ValueType::String)
        .expect("declare");
    builder.push_string_literal("text").expect("default");
    builder
        .complete_variable_initialization()
        .expect("initialization");

    // n = n + s
    crate::common::assign_binary(&mut builder, "n", "n", "+", "s");

    assert!(builder
        .diagnostics()
        .iter()
        .any(|diagnostic| diagnostic.message.contains("same type")));
    let program = finish_entrypoint(builder);
    assert!(program.has_fatal_error());
}

#[test]
fn undeclared_operands_report_and_emit_noop() {
    let mut builder = builder_with_entrypoint();

    builder.push_variable_operand("ghost").expect("soft failure");

    assert!(!builder.diagnostics().is_empty());
    let program = finish_entrypoint(builder);
    assert!(program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    assert!(matches!(ops.last(), Some(Operation::NoOp)));
}

#[test]
fn duplicate_declarations_report_and_continue() {
    let mut builder = builder_with_entrypoint();
    declare_integer(&mut builder, "x", 1);

    builder
        .declare_variable("x", ValueType::Real)
        .expect("soft failure");

    assert!(!builder.diagnostics().is_empty());

    // Later statements still build.
    declare_integer(&mut builder, "y", 2);
    let program = finish_entrypoint(builder);
    assert!(program.has_fatal_error());

    let name = program.strings.lookup("y").expect("interned");
    let body = entrypoint_body(&program);
    let scope = body.scope().expect("body scope");
    assert_eq!(
        program.scopes.variable_type(scope, name),
        Some(ValueType::Integer)
    );
}

#[test]
fn structures_may_not_contain_themselves() {
    let mut builder = builder_with_entrypoint();

    builder.register_structure_type("Node").expect("open");
    builder
        .register_structure_member("value", ValueType::Integer)
        .expect("member");
    builder.register_structure_unknown_type_name("Node");
    builder
        .register_structure_member_unknown("next")
        .expect("soft failure");
    builder.finish_structure_type().expect("close");

    assert!(builder
        .diagnostics()
        .iter()
        .any(|diagnostic| diagnostic.message.contains("instance of itself")));
}

#[test]
fn empty_structures_are_rejected() {
    let mut builder = builder_with_entrypoint();

    builder.register_structure_type("Empty").expect("open");
    builder.finish_structure_type().expect("close");

    assert!(builder
        .diagnostics()
        .iter()
        .any(|diagnostic| diagnostic.message.contains("at least one member")));
    assert_eq!(builder.program().registry.structure_count(), 0);
}

#[test]
fn constants_reject_reassignment() {
    let mut builder = builder_with_entrypoint();

    builder
        .declare_constant("limit", ValueType::Integer)
        .expect("declare");
    builder.push_integer_literal(10).expect("default");
    builder
        .complete_variable_initialization()
        .expect("initialization");

    // limit = 11 must fail.
    builder
        .register_infix_operand_as_lvalue("limit")
        .expect("lvalue");
    builder.push_integer_literal(11).expect("value");
    builder.count_parameter();
    builder.register_infix_operand();
    builder.terminate_infix_expression().expect("terminate");
    builder.pop_parameter_count();

    assert!(builder
        .diagnostics()
        .iter()
        .any(|diagnostic| diagnostic.message.contains("constants")));
    let program = finish_entrypoint(builder);
    assert!(program.has_fatal_error());
}

#[test]
fn elseif_without_if_is_a_structural_failure() {
    let mut builder = builder_with_entrypoint();
    let error = builder
        .register_control("elseif", false)
        .expect_err("no if() precedes");
    assert_eq!(error.kind, fugue::ir::IrErrorKind::Structural);
}

#[test]
fn unknown_control_keywords_are_structural_failures() {
    let mut builder = builder_with_entrypoint();
    assert!(builder.register_control("frobnicate", false).is_err());

    // Registered extension keywords are accepted.
    builder.register_extension_keyword("accelerate");
    assert!(builder.register_control("accelerate", false).is_ok());
}
