//! Function definition: preparse collection, return replay, ghosting.

use fugue::ir::{FunctionKind, Operation, ValueType};

use crate::common::{builder_with_entrypoint, entrypoint_body, finish_entrypoint};

#[test]
fn preparse_creates_the_function_with_params_and_returns() {
    let mut builder = builder_with_entrypoint();

    builder.register_function_name("addtwo").expect("name");
    builder
        .register_param("p", ValueType::Integer)
        .expect("param");
    builder.begin_function_returns();
    builder
        .register_function_return("ret", ValueType::Integer, Operation::PushInteger(0))
        .expect("return");
    builder.enter_block_preparse();
    builder.exit_block_preparse().expect("preparse exit");

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let name = program.strings.lookup("addtwo").expect("interned");
    let function = program
        .scopes
        .function_id(program.global_scope, name)
        .or_else(|| {
            // Declared inside the entrypoint body; resolve from there.
            let body = entrypoint_body(&program);
            body.scope()
                .and_then(|scope| program.scopes.function_id(scope, name))
        })
        .expect("function is declared");

    let Some(FunctionKind::User(function)) = program.functions.get(function) else {
        panic!("addtwo is a user function");
    };

    let params = program.scopes.get(function.params).expect("params scope");
    assert_eq!(params.member_order().len(), 1);
    assert!(params.parent.is_none(), "params scopes detach from parents");

    let returns = program.scopes.get(function.returns).expect("returns scope");
    assert_eq!(returns.member_order().len(), 1);
    assert!(returns.parent.is_none());

    // The returns scope registered itself as a tuple type named after
    // the function.
    assert!(returns.tuple_types().contains_key(&name));
    assert_eq!(program.registry.tuple_count(), 2);
}

#[test]
fn body_entry_ghosts_params_and_replays_return_initialization() {
    let mut builder = builder_with_entrypoint();

    builder.register_function_name("addtwo").expect("name");
    builder
        .register_param("p", ValueType::Integer)
        .expect("param");
    builder.begin_function_returns();
    builder
        .register_function_return("ret", ValueType::Integer, Operation::PushInteger(0))
        .expect("return");
    builder.enter_block_preparse();
    builder.exit_block_preparse().expect("preparse exit");

    builder.register_function_body("addtwo").expect("body open");
    builder.enter_block().expect("body entry");

    // ret = p + 2
    builder
        .register_infix_operand_as_lvalue("ret")
        .expect("lvalue");
    builder.push_variable_operand("p").expect("p resolves via ghosts");
    builder.count_parameter();
    builder.register_infix_operand();
    builder.push_infix_operator("+");
    builder.push_integer_literal(2).expect("literal");
    builder.count_parameter();
    builder.register_infix_operand();
    builder.terminate_infix_expression().expect("terminate");
    builder.pop_parameter_count();

    builder.exit_block().expect("body exit");

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let name = program.strings.lookup("addtwo").expect("interned");
    let body = entrypoint_body(&program);
    let scope = body.scope().expect("body scope");
    let function = program
        .scopes
        .function_id(scope, name)
        .expect("function is declared");
    let Some(FunctionKind::User(function)) = program.functions.get(function) else {
        panic!("addtwo is a user function");
    };
    let body = function.body.as_ref().expect("body attached");

    // Replayed initialization: the stored default downgraded to a
    // one-time initialization at the block head.
    assert!(matches!(body.ops()[0], Operation::PushInteger(0)));
    assert!(matches!(body.ops()[1], Operation::InitializeValue(_)));

    // The assignment through the ghosted names follows.
    assert!(body
        .ops()
        .iter()
        .any(|op| matches!(op, Operation::AssignValue(_))));

    // The body scope ghosts both the params and the returns scopes.
    let body_scope = program.scopes.get(body.scope().expect("scope")).expect("scope");
    assert_eq!(body_scope.ghosts().len(), 1);
    assert_eq!(body_scope.ghosts()[0].len(), 2);
}

#[test]
fn calls_check_arity_against_the_parameter_scope() {
    let mut builder = builder_with_entrypoint();

    builder.register_function_name("one").expect("name");
    builder
        .register_param("p", ValueType::Integer)
        .expect("param");
    builder.enter_block_preparse();
    builder.exit_block_preparse().expect("preparse exit");

    // one(1, 2) has the wrong arity.
    builder.push_parameter_count();
    builder.push_integer_literal(1).expect("arg");
    builder.count_parameter();
    builder.push_integer_literal(2).expect("arg");
    builder.count_parameter();
    builder.register_function_call("one").expect("call");
    builder.pop_parameter_count();

    assert!(!builder.diagnostics().is_empty());
    let program = finish_entrypoint(builder);
    assert!(program.has_fatal_error());

    let ops = entrypoint_body(&program).ops();
    assert!(matches!(ops.last(), Some(Operation::NoOp)));
}

#[test]
fn function_typed_params_carry_their_signature() {
    let mut builder = builder_with_entrypoint();

    // Register a signature first, then use it for a higher-order param.
    let mut signature = fugue::ir::FunctionSignature::new();
    signature.add_param(ValueType::Integer, 0, None);
    signature.add_return(ValueType::Integer, 0);
    builder
        .register_function_signature("unary", signature)
        .expect("signature");

    builder.register_function_name("apply").expect("name");
    builder
        .register_function_param("f", "unary")
        .expect("function param");
    builder
        .register_param("v", ValueType::Integer)
        .expect("value param");
    builder.enter_block_preparse();
    builder.exit_block_preparse().expect("preparse exit");

    let program = finish_entrypoint(builder);
    assert!(!program.has_fatal_error());

    let name = program.strings.lookup("apply").expect("interned");
    let body = entrypoint_body(&program);
    let scope = body.scope().expect("body scope");
    let function = program
        .scopes
        .function_id(scope, name)
        .expect("function is declared");
    let params = match program.functions.get(function) {
        Some(FunctionKind::User(function)) => function.params,
        _ => panic!("apply is a user function"),
    };

    let params = program.scopes.get(params).expect("params scope");
    let f = program.strings.lookup("f").expect("interned");
    assert_eq!(
        params.variable(f).map(|variable| variable.ty),
        Some(ValueType::Function)
    );
    let nested = params.function_signature(f).expect("signature travels");
    assert_eq!(nested.param_count(), 1);
}

#[test]
fn infix_functions_must_take_two_parameters() {
    let mut builder = builder_with_entrypoint();

    builder.register_user_defined_infix();
    builder.register_function_name("lonely").expect("name");
    builder
        .register_param("p", ValueType::Integer)
        .expect("param");
    builder.enter_block_preparse();
    builder.exit_block_preparse().expect("preparse exit");

    assert!(builder
        .diagnostics()
        .iter()
        .any(|diagnostic| diagnostic.message.contains("exactly 2 parameters")));
}
