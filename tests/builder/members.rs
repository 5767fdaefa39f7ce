//! Nested member access: r-value chains and deep l-value stores.

use fugue::ir::{Operation, ValueType};

use crate::common::{builder_with_entrypoint, declare_integer, entrypoint_body, finish_entrypoint};

fn define_nested_structures(builder: &mut fugue::builder::SemanticBuilder) {
    // structure Inner { integer depth }
    builder.register_structure_type("Inner").expect("open");
    builder
        .register_structure_member("depth", ValueType::Integer)
        .expect("member");
    builder.finish_structure_type().expect("close");

    // structure Outer { Inner inner, integer tag }
    builder.register_structure_type("Outer").expect("open");
    builder.register_structure_unknown_type_name("Inner");
    builder
        .register_structure_member_unknown("inner")
        .expect("nested member");
    builder
        .register_structure_member("tag", ValueType::Integer)
        .expect("member");
    builder.finish_structure_type().expect("close");

    builder
        .declare_structure_variable("o", "Outer")
        .expect("declare");
}

#[test]
fn reading_a_nested_member_chains_indirect_reads() {
    let mut builder = builder_with_entrypoint();
    define_nested_structures(&mut builder);
    declare_integer(&mut builder, "x", 0);

    // x = o.inner.depth
    builder
        .register_infix_operand_as_lvalue("x")
        .expect("lvalue");
    builder.push_variable_operand("o").expect("eager read");
    builder.count_parameter();
    builder.register_infix_operand();
    builder.register_member_access("inner");
    builder.register_member_access("depth");
    builder.terminate_infix_expression().expect("terminate");
    builder.pop_parameter_count();

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    let tail = &ops[ops.len() - 3..];
    assert!(matches!(
        tail[0].push_source(),
        Some(Operation::ReadStructure { .. })
    ));
    assert!(matches!(
        tail[1].push_source(),
        Some(Operation::ReadStructureIndirect {
            member_type: ValueType::Integer,
            ..
        })
    ));
    assert!(matches!(tail[2], Operation::AssignValue(_)));
}

#[test]
fn deep_lvalue_stores_bind_then_assign_indirect() {
    let mut builder = builder_with_entrypoint();
    define_nested_structures(&mut builder);

    // o.inner.depth = 7
    builder.save_lvalue_name("o");
    builder.register_member_lvalue_access("inner");
    builder.register_member_lvalue_access("depth");
    builder.register_composite_lvalue().expect("root");
    builder.reset_member_access_lvalue().expect("store ops");
    builder.push_parameter_count();
    builder.push_integer_literal(7).expect("value");
    builder.count_parameter();
    builder
        .finalize_composite_assignment()
        .expect("finalize");
    builder.pop_parameter_count();

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    let tail = &ops[ops.len() - 3..];
    assert!(matches!(tail[0], Operation::PushInteger(7)));
    assert!(matches!(
        tail[1].push_source(),
        Some(Operation::BindStructMemberReference {
            variable: Some(_),
            ..
        })
    ));
    assert!(
        matches!(tail[2], Operation::AssignStructureIndirect { .. }),
        "the store instruction ends at the tail"
    );
}

#[test]
fn member_type_mismatches_are_fatal() {
    let mut builder = builder_with_entrypoint();
    define_nested_structures(&mut builder);

    // o.tag = 1.5 (tag is an integer)
    builder.save_lvalue_name("o");
    builder.register_member_lvalue_access("tag");
    builder.register_composite_lvalue().expect("root");
    builder.reset_member_access_lvalue().expect("store ops");
    builder.push_parameter_count();
    builder.push_real_literal(1.5).expect("value");
    builder.count_parameter();
    builder
        .finalize_composite_assignment()
        .expect("finalize");
    builder.pop_parameter_count();

    assert!(!builder.diagnostics().is_empty());
    let program = finish_entrypoint(builder);
    assert!(program.has_fatal_error());
}

#[test]
fn tuples_reject_nested_member_paths() {
    let mut builder = builder_with_entrypoint();

    builder.register_tuple_type("Pair").expect("open");
    builder
        .register_tuple_member("first", ValueType::Integer)
        .expect("member");
    builder
        .register_tuple_member("second", ValueType::Integer)
        .expect("member");
    builder.finish_tuple_type().expect("close");
    builder.declare_tuple_variable("p", "Pair").expect("declare");

    builder.save_lvalue_name("p");
    builder.register_member_lvalue_access("first");
    builder.register_member_lvalue_access("second");
    builder.register_composite_lvalue().expect("root");
    let error = builder
        .reset_member_access_lvalue()
        .expect_err("nested tuples are not permitted");
    assert_eq!(error.kind, fugue::ir::IrErrorKind::Structural);
}
