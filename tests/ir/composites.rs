use fugue::ir::{CompositeType, Program, Scope, ValueType};

#[test]
fn offsets_are_partial_sums_of_member_sizes() {
    let mut program = Program::new();
    let a = program.intern("a");
    let b = program.intern("b");
    let c = program.intern("c");

    let mut ty = CompositeType::new();
    ty.add_member(a, ValueType::Integer).expect("member a");
    ty.add_member(b, ValueType::Integer16).expect("member b");
    ty.add_member(c, ValueType::Real).expect("member c");
    ty.compute_offsets(&program.registry).expect("offsets");

    assert_eq!(ty.member(a).map(|info| info.offset), Some(0));
    assert_eq!(ty.member(b).map(|info| info.offset), Some(4));
    assert_eq!(ty.member(c).map(|info| info.offset), Some(6));
    assert_eq!(ty.size(&program.registry).expect("size"), 10);
}

#[test]
fn compute_offsets_is_idempotent() {
    let mut program = Program::new();
    let a = program.intern("a");
    let b = program.intern("b");

    let mut ty = CompositeType::new();
    ty.add_member(a, ValueType::Integer).expect("member a");
    ty.add_member(b, ValueType::Real).expect("member b");

    ty.compute_offsets(&program.registry).expect("first run");
    let first: Vec<u32> = ty
        .member_order()
        .iter()
        .filter_map(|member| ty.member(*member).map(|info| info.offset))
        .collect();

    ty.compute_offsets(&program.registry).expect("second run");
    let second: Vec<u32> = ty
        .member_order()
        .iter()
        .filter_map(|member| ty.member(*member).map(|info| info.offset))
        .collect();

    assert_eq!(first, second);
}

#[test]
fn composite_members_recurse_through_the_registry() {
    let mut program = Program::new();
    let x = program.intern("x");
    let y = program.intern("y");
    let inner_name = program.intern("inner");
    let tail = program.intern("tail");

    let owner = program.scopes.alloc(Scope::new());

    let mut inner = CompositeType::new();
    inner.add_member(x, ValueType::Integer).expect("member x");
    inner.add_member(y, ValueType::Integer).expect("member y");
    inner.compute_offsets(&program.registry).expect("offsets");
    let inner_id = program.registry.register_structure(owner, inner);

    let mut outer = CompositeType::new();
    outer
        .add_composite_member(inner_name, ValueType::Structure, inner_id)
        .expect("nested member");
    outer.add_member(tail, ValueType::Boolean).expect("tail");
    outer.compute_offsets(&program.registry).expect("offsets");

    assert_eq!(outer.member(inner_name).map(|info| info.offset), Some(0));
    assert_eq!(outer.member(tail).map(|info| info.offset), Some(8));
}

#[test]
fn duplicate_member_names_are_rejected() {
    let mut program = Program::new();
    let a = program.intern("a");

    let mut ty = CompositeType::new();
    ty.add_member(a, ValueType::Integer).expect("first add");
    assert!(ty.add_member(a, ValueType::Real).is_err());
}
