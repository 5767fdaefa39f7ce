use fugue::ir::{CompositeId, CompositeType, Program, Scope, ValueType};

fn sample_type(program: &mut Program, member: &str) -> CompositeType {
    let id = program.intern(member);
    let mut ty = CompositeType::new();
    ty.add_member(id, ValueType::Integer).expect("member");
    ty
}

#[test]
fn ids_are_dense_and_start_at_one() {
    let mut program = Program::new();
    let owner = program.scopes.alloc(Scope::new());

    let first = sample_type(&mut program, "a");
    let second = sample_type(&mut program, "b");

    let first_id = program.registry.register_tuple(owner, first);
    let second_id = program.registry.register_tuple(owner, second);

    assert_eq!(first_id.value(), 1);
    assert_eq!(second_id.value(), 2);
}

#[test]
fn tuple_and_structure_namespaces_are_independent() {
    let mut program = Program::new();
    let owner = program.scopes.alloc(Scope::new());

    let tuple = sample_type(&mut program, "t");
    let structure = sample_type(&mut program, "s");

    let tuple_id = program.registry.register_tuple(owner, tuple);
    let structure_id = program.registry.register_structure(owner, structure);

    assert_eq!(tuple_id.value(), 1);
    assert_eq!(structure_id.value(), 1);
    assert!(program.registry.tuple(tuple_id).is_some());
    assert!(program.registry.structure(structure_id).is_some());
}

#[test]
fn every_id_has_exactly_one_owner() {
    let mut program = Program::new();
    let first_scope = program.scopes.alloc(Scope::new());
    let second_scope = program.scopes.alloc(Scope::new());

    let first = sample_type(&mut program, "a");
    let second = sample_type(&mut program, "b");

    let first_id = program.registry.register_structure(first_scope, first);
    let second_id = program.registry.register_structure(second_scope, second);

    assert_eq!(program.registry.structure_owner(first_id), Some(first_scope));
    assert_eq!(program.registry.structure_owner(second_id), Some(second_scope));
}

#[test]
fn installing_over_an_existing_id_is_rejected() {
    let mut program = Program::new();
    let owner = program.scopes.alloc(Scope::new());

    let ty = sample_type(&mut program, "a");
    let duplicate = sample_type(&mut program, "b");

    let id = program.registry.register_structure(owner, ty);
    assert!(program
        .registry
        .install_structure(id, owner, duplicate)
        .is_err());
}

#[test]
fn id_zero_is_reserved_as_the_no_hint_sentinel() {
    let mut program = Program::new();
    let owner = program.scopes.alloc(Scope::new());
    let ty = sample_type(&mut program, "a");

    assert!(program
        .registry
        .install_tuple(CompositeId::new(0), owner, ty)
        .is_err());
}
