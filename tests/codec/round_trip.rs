//! Write → load → write fixpoints and operation-stream equality.

use fugue::asm::write_program_text;
use fugue::codec::{load_program, write_program};
use fugue::ir::{
    Block, ExtensionBlock, FunctionKind, FunctionSignature, NativeCall, Operation, Program,
    ResponseMap, ResponseMapEntry, Scope, ValueType,
};

use crate::common::{program_with_body, rich_program};

#[test]
fn rich_program_round_trips_to_a_byte_fixpoint() {
    let program = rich_program();

    let first = write_program(&program).expect("first encode");
    let loaded = load_program(&first).expect("load");
    let second = write_program(&loaded).expect("second encode");

    assert_eq!(first, second, "encode → load → encode is a fixpoint");
    assert_eq!(write_program_text(&program), write_program_text(&loaded));
}

#[test]
fn structure_program_keeps_identical_operation_streams() {
    let program = program_with_body(|builder| {
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

        for (member, value) in [("a", 2i32), ("b", 0)] {
            builder.save_lvalue_name("s");
            builder.register_member_lvalue_access(member);
            builder.register_composite_lvalue().expect("root");
            builder.reset_member_access_lvalue().expect("stores");
            builder.push_parameter_count();
            if member == "a" {
                builder.push_integer_literal(value).expect("value");
            } else {
                builder.push_real_literal(3.5).expect("value");
            }
            builder.count_parameter();
            builder
                .finalize_composite_assignment()
                .expect("finalize");
            builder.pop_parameter_count();
        }
    });

    let bytes = write_program(&program).expect("encode");
    let loaded = load_program(&bytes).expect("load");

    // Registry contents survive: one structure, members [a, b] at
    // offsets [0, 4].
    assert_eq!(loaded.registry.structure_count(), 1);
    let (_, ty) = loaded.registry.structures().next().expect("structure");
    let offsets: Vec<u32> = ty
        .member_order()
        .iter()
        .filter_map(|member| ty.member(*member).map(|info| info.offset))
        .collect();
    assert_eq!(offsets, vec![0, 4]);

    // Identical operation streams, compared through the traversal form.
    assert_eq!(write_program_text(&program), write_program_text(&loaded));
}

#[test]
fn elseif_chains_survive_the_codec() {
    let program = program_with_body(|builder| {
        builder
            .declare_variable("a", ValueType::Integer)
            .expect("declare");
        builder.push_integer_literal(1).expect("value");
        builder
            .complete_variable_initialization()
            .expect("initialization");

        let condition = |builder: &mut fugue::builder::SemanticBuilder, operator: &str| {
            builder.push_parameter_count();
            builder.reset_infix_tracking();
            builder.push_variable_operand("a").expect("a");
            builder.count_parameter();
            builder.register_infix_operand();
            builder.push_infix_operator(operator);
            builder.push_integer_literal(0).expect("0");
            builder.count_parameter();
            builder.register_infix_operand();
            builder.terminate_infix_expression().expect("terminate");
            builder.pop_parameter_count();
        };

        builder.register_control("if", false).expect("if");
        condition(builder, ">");
        builder.enter_block().expect("if body");
        builder.exit_block().expect("if exit");

        builder.register_control("elseif", false).expect("elseif");
        condition(builder, "==");
        builder.enter_block().expect("elseif body");
        builder.exit_block().expect("elseif exit");

        builder.register_control("else", false).expect("else");
        builder.enter_block().expect("else body");
        builder.exit_block().expect("else exit");
    });

    let bytes = write_program(&program).expect("encode");
    let loaded = load_program(&bytes).expect("load");
    let again = write_program(&loaded).expect("re-encode");

    assert_eq!(bytes, again);

    // The reloaded chain still satisfies the if-chain discipline.
    let name = loaded.strings.lookup("entrypoint").expect("interned");
    let function = loaded
        .scopes
        .function_id(loaded.global_scope, name)
        .expect("entrypoint");
    let Some(FunctionKind::User(function)) = loaded.functions.get(function) else {
        panic!("entrypoint is a user function");
    };
    let body = function.body.as_ref().expect("body");
    let if_op = body
        .ops()
        .iter()
        .find(|op| matches!(op, Operation::If { .. }))
        .expect("the chain loaded");
    let Operation::If {
        else_if_wrapper,
        false_block,
        ..
    } = if_op
    else {
        unreachable!()
    };
    let wrapper = else_if_wrapper.as_ref().expect("wrapper survived");
    let arm = wrapper
        .ops()
        .iter()
        .find_map(|op| match op {
            Operation::ElseIf { block } => Some(block),
            _ => None,
        })
        .expect("one arm");
    assert!(matches!(arm.tail(), Some(Operation::ExitIfChain)));
    assert!(false_block.is_some());
}

#[test]
fn signatures_native_stubs_and_extension_data_round_trip() {
    let mut program = Program::new();
    program.set_uses_console();

    let library = program.intern("mathlib");
    program.extensions.push(library);
    program.extension_data.push(ExtensionBlock {
        library,
        bytes: vec![0xDE, 0xAD, 0xBE, 0xEF],
    });

    // A higher-order signature: one function-typed parameter with a
    // nested signature, one by-reference integer.
    let mut nested = FunctionSignature::new();
    nested.add_param(ValueType::Integer, 0, None);
    nested.add_return(ValueType::Integer, 0);

    let mut signature = FunctionSignature::new();
    signature.add_param(ValueType::Function, 0, Some(nested));
    signature.add_param(ValueType::Integer, 0, None);
    signature.set_last_param_reference();
    signature.add_return(ValueType::Real, 0);

    let signature_name = program.intern("apply");
    let global = program.global_scope;
    program
        .scopes
        .get_mut(global)
        .expect("global scope")
        .add_function_signature(signature_name, signature);

    // A native-call stub.
    let platform = program.intern("platform");
    let entry_point = program.intern("platform_clock");
    let params = program.scopes.alloc(Scope::new());
    let stub = program.functions.alloc(FunctionKind::Native(NativeCall {
        library: platform,
        entry_point,
        params,
        return_type: ValueType::Integer,
        return_hint: 0,
    }));
    let clock = program.intern("clock");
    program
        .scopes
        .get_mut(global)
        .expect("global scope")
        .add_function(clock, stub)
        .expect("register stub");

    // A response map with one entry.
    let ping = program.intern("ping");
    let handler_scope = program.scopes.alloc(Scope::new());
    let mut handler = Block::with_scope(handler_scope);
    handler.append(Operation::SendTaskMessage {
        by_name: true,
        message: ping,
        payload_types: vec![ValueType::Integer],
    });
    let payload = program.intern("payload");
    let mut aux = Scope::new();
    aux.add_variable(payload, ValueType::Integer)
        .expect("payload variable");
    let aux = program.scopes.alloc(aux);
    let mut map = ResponseMap::new();
    map.add_entry(ResponseMapEntry {
        message: ping,
        payload_types: vec![ValueType::Integer],
        handler,
        aux_scope: aux,
    });
    let map_name = program.intern("responses");
    program
        .scopes
        .get_mut(global)
        .expect("global scope")
        .add_response_map(map_name, map);

    // A global init block with a short-circuit compound.
    let flag = program.intern("flag");
    program
        .scopes
        .get_mut(global)
        .expect("global scope")
        .add_variable(flag, ValueType::Boolean)
        .expect("declare");
    {
        let compound = Operation::LogicalAnd {
            operations: vec![Operation::PushBoolean(true), Operation::PushBoolean(false)],
        };
        let pushed = {
            let ctx = program.type_context();
            Operation::push(compound, global, &ctx)
        };
        let init = program.create_global_init_block();
        init.append(Operation::InitializeValue(flag));
        init.append(pushed);
        init.append(Operation::AssignValue(flag));
    }

    let first = write_program(&program).expect("first encode");
    let loaded = load_program(&first).expect("load");
    let second = write_program(&loaded).expect("second encode");

    assert_eq!(first, second);
    assert!(loaded.uses_console());
    assert_eq!(loaded.extension_data.len(), 1);
    assert_eq!(loaded.extension_data[0].bytes, vec![0xDE, 0xAD, 0xBE, 0xEF]);

    // The nested signature survived with its reference flag.
    let signature_name = loaded.strings.lookup("apply").expect("interned");
    let signature = loaded
        .scopes
        .function_signature(loaded.global_scope, signature_name)
        .expect("signature loaded");
    assert_eq!(signature.params.len(), 2);
    assert!(signature.nested[0].is_some());
    assert_eq!(
        signature.param_flags[1] & fugue::ir::PARAM_FLAG_REFERENCE,
        fugue::ir::PARAM_FLAG_REFERENCE
    );

    // The compound kept its children in order.
    let init = loaded.global_init.as_ref().expect("global init");
    let compound = init
        .ops()
        .iter()
        .find_map(|op| match op.push_source() {
            Some(Operation::LogicalAnd { operations }) => Some(operations),
            _ => None,
        })
        .expect("compound loaded");
    assert_eq!(
        compound,
        &vec![Operation::PushBoolean(true), Operation::PushBoolean(false)]
    );
}
