use fugue::ir::{Program, Scope, ValueType};

#[test]
fn variable_resolution_walks_the_parent_chain() {
    let mut program = Program::new();
    let name = program.intern("outer");

    let global = program.global_scope;
    program
        .scopes
        .get_mut(global)
        .expect("global scope")
        .add_variable(name, ValueType::Integer)
        .expect("declare");

    let child = program.scopes.alloc(Scope::with_parent(global));
    let grandchild = program.scopes.alloc(Scope::with_parent(child));

    assert_eq!(
        program.scopes.variable_type(grandchild, name),
        Some(ValueType::Integer)
    );
    assert_eq!(
        program.scopes.scope_owning_variable(grandchild, name),
        Some(global)
    );
}

#[test]
fn resolution_stops_at_a_null_parent() {
    let mut program = Program::new();
    let name = program.intern("hidden");

    let global = program.global_scope;
    program
        .scopes
        .get_mut(global)
        .expect("global scope")
        .add_variable(name, ValueType::Integer)
        .expect("declare");

    let detached = program.scopes.alloc(Scope::new());
    assert_eq!(program.scopes.variable_type(detached, name), None);
}

#[test]
fn ghosts_expose_another_scope_without_relocating_it() {
    let mut program = Program::new();
    let param = program.intern("param");

    let params = program.scopes.alloc(Scope::new());
    program
        .scopes
        .get_mut(params)
        .expect("params scope")
        .add_variable(param, ValueType::Real)
        .expect("declare");

    let body = program.scopes.alloc(Scope::with_parent(program.global_scope));
    program
        .scopes
        .get_mut(body)
        .expect("body scope")
        .push_ghost_set();
    program
        .scopes
        .ghost_into_scope(body, params)
        .expect("ghost in");

    assert_eq!(
        program.scopes.variable_type(body, param),
        Some(ValueType::Real)
    );
    assert_eq!(
        program.scopes.scope_owning_variable(body, param),
        Some(params)
    );

    // Popping the ghost set restores the original visibility.
    program
        .scopes
        .get_mut(body)
        .expect("body scope")
        .pop_ghost_set();
    assert_eq!(program.scopes.variable_type(body, param), None);
}

#[test]
fn duplicate_variable_names_are_rejected_per_scope() {
    let mut program = Program::new();
    let name = program.intern("twice");
    let global = program.global_scope;

    let scope = program.scopes.get_mut(global).expect("global scope");
    scope.add_variable(name, ValueType::Integer).expect("first");
    assert!(scope.add_variable(name, ValueType::Real).is_err());
}

#[test]
fn constants_resolve_through_the_owning_scope() {
    let mut program = Program::new();
    let name = program.intern("limit");
    let global = program.global_scope;

    {
        let scope = program.scopes.get_mut(global).expect("global scope");
        scope.add_variable(name, ValueType::Integer).expect("declare");
        scope.set_constant(name);
    }

    let child = program.scopes.alloc(Scope::with_parent(global));
    assert!(program.scopes.is_constant(child, name));
}

#[test]
fn scope_tree_stays_acyclic() {
    let mut program = Program::new();
    let child = program.scopes.alloc(Scope::with_parent(program.global_scope));
    let grandchild = program.scopes.alloc(Scope::with_parent(child));
    let _ = grandchild;
    assert!(program.scopes.check_acyclic().is_ok());
}
