//! End-to-end builder scenarios over the operation stream they produce.

use fugue::ir::{ArithmeticKind, Operation, ValueType};

use crate::common::{builder_with_entrypoint, declare_integer, entrypoint_body, finish_entrypoint};

#[test]
fn declaration_assignment_and_debug_write() {
    let mut builder = builder_with_entrypoint();

    // integer(x, 5)
    builder
        .declare_variable("x", ValueType::Integer)
        .expect("declare");
    builder.push_integer_literal(5).expect("literal");
    builder
        .complete_variable_initialization()
        .expect("initialization");

    // x = x + 3
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

    // debugwritestring(cast(string, x))
    builder.push_parameter_count();
    builder.push_parameter_count();
    builder.push_variable_operand("x").expect("operand");
    builder.count_parameter();
    builder.register_cast(ValueType::String).expect("cast");
    builder.pop_parameter_count();
    builder.count_parameter();
    builder.register_debug_write().expect("debug write");
    builder.pop_parameter_count();

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());
    assert!(program.global_init.is_none());

    let ops = entrypoint_body(&program).ops();
    assert_eq!(ops.len(), 9);
    assert!(matches!(ops[0], Operation::InitializeValue(_)));
    assert!(matches!(ops[1], Operation::PushInteger(5)));
    assert!(matches!(ops[2], Operation::AssignValue(_)));
    assert!(matches!(
        ops[3].push_source(),
        Some(Operation::GetVariableValue(_))
    ));
    assert!(matches!(ops[4], Operation::PushInteger(3)));
    assert!(matches!(
        ops[5].push_source(),
        Some(Operation::Arithmetic {
            kind: ArithmeticKind::Sum,
            operand_type: ValueType::Integer,
            first_is_array: false,
            second_is_array: false,
            operand_count: 2,
        })
    ));
    assert!(matches!(ops[6], Operation::AssignValue(_)));
    assert!(matches!(
        ops[7].push_source(),
        Some(Operation::TypeCastToString {
            source: ValueType::Integer,
            ..
        })
    ));
    assert!(matches!(ops[8], Operation::DebugWriteString));
}

#[test]
fn if_elseif_else_builds_one_chain() {
    let mut builder = builder_with_entrypoint();
    declare_integer(&mut builder, "a", 1);
    declare_integer(&mut builder, "b", 2);
    declare_integer(&mut builder, "out", 0);

    let condition = |builder: &mut fugue::builder::SemanticBuilder, operator: &str| {
        builder.push_parameter_count();
        builder.reset_infix_tracking();
        builder.push_variable_operand("a").expect("a");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.push_infix_operator(operator);
        builder.push_variable_operand("b").expect("b");
        builder.count_parameter();
        builder.register_infix_operand();
        builder.terminate_infix_expression().expect("terminate");
        builder.pop_parameter_count();
    };

    // if(a > b) { out = a + b }
    builder.register_control("if", false).expect("if");
    condition(&mut builder, ">");
    builder.enter_block().expect("if body");
    crate::common::assign_binary(&mut builder, "out", "a", "+", "b");
    builder.exit_block().expect("if exit");

    // elseif(a == b) { out = a - b }
    builder.register_control("elseif", false).expect("elseif");
    condition(&mut builder, "==");
    builder.enter_block().expect("elseif body");
    crate::common::assign_binary(&mut builder, "out", "a", "-", "b");
    builder.exit_block().expect("elseif exit");

    // else { out = a * b }
    builder.register_control("else", false).expect("else");
    builder.enter_block().expect("else body");
    crate::common::assign_binary(&mut builder, "out", "a", "*", "b");
    builder.exit_block().expect("else exit");

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    let if_op = ops
        .iter()
        .find(|op| matches!(op, Operation::If { .. }))
        .expect("an If was emitted");

    let Operation::If {
        true_block,
        false_block,
        else_if_wrapper,
    } = if_op
    else {
        unreachable!()
    };
    assert!(true_block.is_some());
    assert!(false_block.is_some(), "else installs the false block");

    let wrapper = else_if_wrapper.as_ref().expect("one elseif wrapper");
    let arms: Vec<&Operation> = wrapper
        .ops()
        .iter()
        .filter(|op| matches!(op, Operation::ElseIf { .. }))
        .collect();
    assert_eq!(arms.len(), 1);

    let Operation::ElseIf { block } = arms[0] else {
        unreachable!()
    };
    assert!(
        matches!(block.tail(), Some(Operation::ExitIfChain)),
        "every elseif body ends in ExitIfChain"
    );

    // Exactly one If owns the chain.
    let if_count = ops
        .iter()
        .filter(|op| matches!(op, Operation::If { .. }))
        .count();
    assert_eq!(if_count, 1);
}

#[test]
fn structure_definition_and_member_stores() {
    let mut builder = builder_with_entrypoint();

    // structure S { integer a, real b }
    builder.register_structure_type("S").expect("open");
    builder
        .register_structure_member("a", ValueType::Integer)
        .expect("member a");
    builder
        .register_structure_member("b", ValueType::Real)
        .expect("member b");
    builder.finish_structure_type().expect("close");

    // S s
    builder
        .declare_structure_variable("s", "S")
        .expect("declare");

    // s.a = 2
    builder.save_lvalue_name("s");
    builder.register_member_lvalue_access("a");
    builder.register_composite_lvalue().expect("lvalue root");
    builder.reset_member_access_lvalue().expect("store ops");
    builder.push_parameter_count();
    builder.push_integer_literal(2).expect("value");
    builder.count_parameter();
    builder
        .finalize_composite_assignment()
        .expect("finalize");
    builder.pop_parameter_count();

    // s.b = 3.5
    builder.save_lvalue_name("s");
    builder.register_member_lvalue_access("b");
    builder.register_composite_lvalue().expect("lvalue root");
    builder.reset_member_access_lvalue().expect("store ops");
    builder.push_parameter_count();
    builder.push_real_literal(3.5).expect("value");
    builder.count_parameter();
    builder
        .finalize_composite_assignment()
        .expect("finalize");
    builder.pop_parameter_count();

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    // MemberOrder = [a, b] with offsets [0, 4].
    let (_, ty) = program
        .registry
        .structures()
        .next()
        .expect("one structure type");
    let names: Vec<&str> = ty
        .member_order()
        .iter()
        .map(|member| program.strings.resolve(*member))
        .collect();
    assert_eq!(names, vec!["a", "b"]);
    let offsets: Vec<u32> = ty
        .member_order()
        .iter()
        .filter_map(|member| ty.member(*member).map(|info| info.offset))
        .collect();
    assert_eq!(offsets, vec![0, 4]);

    let ops = entrypoint_body(&program).ops();
    assert!(matches!(ops[0], Operation::PushInteger(2)));
    assert!(matches!(ops[1], Operation::AssignStructure { .. }));
    assert!(matches!(ops[2], Operation::PushReal(_)));
    assert!(matches!(ops[3], Operation::AssignStructure { .. }));
}

#[test]
fn task_with_message_loop_reparents_to_global() {
    let mut builder = builder_with_entrypoint();

    // task("w") { while(true) { acceptmessage(ping, integer x) { ... } } }
    builder.push_parameter_count();
    builder.push_string_literal("w").expect("task name");
    builder.count_parameter();
    builder.register_task().expect("task");
    builder.enter_block().expect("task body");

    builder.register_control("while", false).expect("while");
    builder.push_parameter_count();
    builder.reset_infix_tracking();
    builder.push_boolean_literal(true).expect("condition");
    builder.count_parameter();
    builder.register_infix_operand();
    builder.terminate_infix_expression().expect("terminate");
    builder
        .register_end_of_while_loop_conditional()
        .expect("conditional");
    builder.enter_block().expect("while body");

    builder
        .begin_accept_message("ping", &[("x", ValueType::Integer)])
        .expect("accept");
    builder.enter_block().expect("handler");

    // sendmessage(caller, pong, x + 1)
    builder.push_parameter_count();
    builder.register_get_task_caller().expect("caller");
    builder.reset_infix_tracking();
    builder.push_variable_operand("x").expect("x");
    builder.count_parameter();
    builder.register_infix_operand();
    builder.push_infix_operator("+");
    builder.push_integer_literal(1).expect("1");
    builder.count_parameter();
    builder.register_infix_operand();
    builder.terminate_infix_expression().expect("terminate");
    builder
        .register_send_message(false, "pong")
        .expect("send");
    builder.pop_parameter_count();

    builder.exit_block().expect("handler exit");
    builder.exit_block().expect("while exit");
    builder.exit_block().expect("task exit");
    builder.pop_parameter_count();

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    let fork = ops
        .iter()
        .find(|op| matches!(op, Operation::ForkTask { .. }))
        .expect("a task was forked");
    let Operation::ForkTask { body } = fork else {
        unreachable!()
    };

    // The task body's scope parents to the global scope, not the
    // enclosing function.
    let task_scope = body.scope().expect("task body scope");
    assert_eq!(
        program.scopes.get(task_scope).and_then(|scope| scope.parent),
        Some(program.global_scope)
    );

    // The message loop carries the accept with its payload types.
    let Some(Operation::WhileLoop { body: loop_body }) = body
        .ops()
        .iter()
        .find(|op| matches!(op, Operation::WhileLoop { .. }))
    else {
        panic!("task body contains the message loop");
    };
    let accept = loop_body
        .ops()
        .iter()
        .find(|op| matches!(op, Operation::AcceptMessage { .. }))
        .expect("the loop accepts a message");
    let Operation::AcceptMessage {
        payload_types,
        handler,
        ..
    } = accept
    else {
        unreachable!()
    };
    assert_eq!(payload_types, &vec![ValueType::Integer]);

    // The handler sends back through the caller handle.
    assert!(handler
        .ops()
        .iter()
        .any(|op| matches!(op.push_source(), Some(Operation::GetTaskCaller))));
    assert!(handler
        .ops()
        .iter()
        .any(|op| matches!(op, Operation::SendTaskMessage { by_name: false, .. })));

    // The spawn site's name landed in the debug table.
    assert_eq!(program.debug.task_names.len(), 1);
    assert_eq!(
        program.strings.resolve(program.debug.task_names[0]),
        "w"
    );
}

#[test]
fn parallel_for_with_a_bad_bound_reports_fatal_and_emits_noop() {
    let mut builder = builder_with_entrypoint();

    builder.register_control("parallelfor", false).expect("keyword");
    builder.push_parameter_count();
    builder.push_identifier("i").expect("counter");
    builder.count_parameter();
    builder.push_integer_literal(0).expect("lower");
    builder.count_parameter();
    builder.push_real_literal(10.0).expect("upper, wrong type");
    builder.count_parameter();
    builder.push_integer_literal(4).expect("threads");
    builder.count_parameter();
    builder.register_end_of_parallel_for().expect("arg check");
    builder.enter_block().expect("body");
    builder.exit_block().expect("body exit");

    assert!(!builder.diagnostics().is_empty(), "the bad bound was reported");

    let program = finish_entrypoint(builder);
    assert!(program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    assert!(matches!(ops.last(), Some(Operation::NoOp)));
    assert!(!ops.iter().any(|op| matches!(op, Operation::ParallelFor { .. })));
}

#[test]
fn do_while_loops_carry_their_condition_in_the_body() {
    let mut builder = builder_with_entrypoint();
    declare_integer(&mut builder, "x", 3);

    // do { x = x - 1 } while(x > 0)
    builder.register_control("do", false).expect("do");
    builder.enter_block().expect("body");
    crate::common::assign_binary(&mut builder, "x", "x", "-", "x");
    builder.exit_block().expect("body exit");

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
    builder.pop_do_while_loop().expect("loop close");

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    let Some(Operation::DoWhileLoop { body }) = ops.last() else {
        panic!("the do-while loop ends the body");
    };
    // The condition's comparison sits at the body's tail.
    assert!(matches!(
        body.tail().and_then(|op| op.push_source()),
        Some(Operation::Compare { .. })
    ));
}

#[test]
fn response_maps_register_their_entries_on_the_scope() {
    let mut builder = builder_with_entrypoint();

    builder.begin_response_map("responses");
    builder
        .begin_response_map_entry("ping", &[("payload", ValueType::Integer)])
        .expect("entry");
    builder.enter_block().expect("handler");
    builder.exit_block().expect("handler exit");
    builder.end_response_map().expect("map close");

    builder
        .register_accept_from_response_map("responses")
        .expect("accept");

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let body = entrypoint_body(&program);
    let scope = body.scope().expect("body scope");
    let name = program.strings.lookup("responses").expect("interned");
    let map = program
        .scopes
        .get(scope)
        .and_then(|scope| scope.response_map(name))
        .expect("the map registered");
    assert_eq!(map.entries().len(), 1);
    assert_eq!(map.entries()[0].payload_types, vec![ValueType::Integer]);

    assert!(body
        .ops()
        .iter()
        .any(|op| matches!(op, Operation::AcceptMessageFromResponseMap { .. })));
}

#[test]
fn parallel_for_with_valid_bounds_builds_the_operation() {
    let mut builder = builder_with_entrypoint();

    builder.register_control("parallelfor", false).expect("keyword");
    builder.push_parameter_count();
    builder.push_identifier("i").expect("counter");
    builder.count_parameter();
    builder.push_integer_literal(0).expect("lower");
    builder.count_parameter();
    builder.push_integer_literal(10).expect("upper");
    builder.count_parameter();
    builder.push_integer_literal(4).expect("threads");
    builder.count_parameter();
    builder.register_end_of_parallel_for().expect("arg check");
    builder.enter_block().expect("body");
    builder.exit_block().expect("body exit");

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    let parallel = ops
        .iter()
        .find(|op| matches!(op, Operation::ParallelFor { .. }))
        .expect("parallelfor was emitted");
    let Operation::ParallelFor { body, counter, .. } = parallel else {
        unreachable!()
    };
    assert_eq!(program.strings.resolve(*counter), "i");

    // The counter lives in the body's fresh child scope.
    let scope = body.scope().expect("body scope");
    assert_eq!(
        program
            .scopes
            .get(scope)
            .and_then(|scope| scope.variable(*counter))
            .map(|variable| variable.ty),
        Some(ValueType::Integer)
    );
}
