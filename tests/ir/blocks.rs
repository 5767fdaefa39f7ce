use fugue::ir::{ArithmeticKind, Block, Operation, Program};

fn push_of(op: Operation, program: &Program) -> Operation {
    let ctx = program.type_context();
    Operation::push(op, program.global_scope, &ctx)
}

fn sum(program: &Program) -> Operation {
    push_of(
        Operation::Arithmetic {
            kind: ArithmeticKind::Sum,
            operand_type: fugue::ir::ValueType::Integer,
            first_is_array: false,
            second_is_array: false,
            operand_count: 2,
        },
        program,
    )
}

#[test]
fn count_tail_ops_groups_operands_with_their_consumer() {
    let mut program = Program::new();
    let x = program.intern("x");
    let scope = program.global_scope;

    let mut block = Block::with_scope(scope);
    block.append(Operation::PushInteger(1));
    block.append(Operation::PushInteger(2));
    block.append(sum(&program));
    block.append(Operation::AssignValue(x));

    let ctx = program.type_context();
    // The assignment consumes the sum, which consumes both pushes.
    assert_eq!(block.count_tail_ops(1, scope, &ctx), 4);

    let mut plain = Block::with_scope(scope);
    plain.append(Operation::PushInteger(1));
    plain.append(Operation::PushInteger(2));
    assert_eq!(plain.count_tail_ops(1, scope, &ctx), 1);
    assert_eq!(plain.count_tail_ops(2, scope, &ctx), 2);
}

#[test]
fn operation_from_end_skips_logical_groups() {
    let mut program = Program::new();
    let scope = program.global_scope;

    let mut block = Block::with_scope(scope);
    block.append(Operation::PushBoolean(true));
    block.append(Operation::PushInteger(1));
    block.append(Operation::PushInteger(2));
    block.append(sum(&program));

    let ctx = program.type_context();
    assert!(matches!(
        block.operation_from_end(0, scope, &ctx),
        Some(Operation::Push(_))
    ));
    assert!(matches!(
        block.operation_from_end(1, scope, &ctx),
        Some(Operation::PushBoolean(true))
    ));
}

#[test]
fn shift_up_tail_rotates_the_tail_upward() {
    let program = Program::new();
    let mut block = Block::with_scope(program.global_scope);
    block.append(Operation::PushInteger(1));
    block.append(Operation::PushInteger(2));
    block.append(Operation::PushInteger(3));

    block.shift_up_tail(2);
    let values: Vec<i32> = block
        .ops()
        .iter()
        .filter_map(|op| match op {
            Operation::PushInteger(value) => Some(*value),
            _ => None,
        })
        .collect();
    assert_eq!(values, vec![3, 1, 2]);
}

#[test]
fn shift_up_tail_group_moves_a_whole_group() {
    let mut program = Program::new();
    let x = program.intern("x");
    let scope = program.global_scope;

    // Store first, value group second; the rotation realizes the
    // store-at-tail ordering.
    let mut block = Block::with_scope(scope);
    block.append(Operation::AssignValue(x));
    block.append(Operation::PushInteger(1));
    block.append(Operation::PushInteger(2));
    block.append(sum(&program));

    {
        let ctx = program.type_context();
        block.shift_up_tail_group(1, scope, &ctx);
    }

    assert!(matches!(block.ops()[0], Operation::PushInteger(1)));
    assert!(matches!(block.ops()[3], Operation::AssignValue(_)));
}

#[test]
fn reverse_tail_groups_swaps_the_two_tail_groups() {
    let mut program = Program::new();
    let x = program.intern("x");
    let scope = program.global_scope;

    let mut block = Block::with_scope(scope);
    block.append(Operation::PushInteger(7));
    block.append(push_of(Operation::GetVariableValue(x), &program));

    {
        let ctx = program.type_context();
        block.reverse_tail_groups(scope, &ctx);
    }

    assert!(matches!(block.ops()[0], Operation::Push(_)));
    assert!(matches!(block.ops()[1], Operation::PushInteger(7)));
}

#[test]
fn pop_tail_and_erase_remove_operations() {
    let program = Program::new();
    let mut block = Block::with_scope(program.global_scope);
    block.append(Operation::PushInteger(1));
    block.append(Operation::PushInteger(2));
    block.append(Operation::PushInteger(3));

    assert!(matches!(block.pop_tail(), Some(Operation::PushInteger(3))));
    assert!(matches!(block.erase(0), Some(Operation::PushInteger(1))));
    assert_eq!(block.len(), 1);
    assert!(matches!(block.tail(), Some(Operation::PushInteger(2))));
}
