//! Short-circuit semantics of the compound operators.

use fugue::exec::{Evaluator, RValue};
use fugue::ir::{Operation, Program};

#[test]
fn logical_and_stops_at_the_first_false_term() {
    let mut program = Program::new();
    let unbound = program.intern("never_evaluated");

    // The second term would fail if evaluated; the first term is false,
    // so evaluation must stop before it.
    let compound = Operation::LogicalAnd {
        operations: vec![
            Operation::PushBoolean(false),
            Operation::Push(fugue::ir::PushSource {
                op: Box::new(Operation::GetVariableValue(unbound)),
                is_cons_array: false,
                is_cons_from_function: false,
            }),
        ],
    };

    let mut evaluator = Evaluator::new(&program);
    let value = evaluator.eval_value(&compound).expect("short circuit");
    assert_eq!(value, RValue::Boolean(false));
}

#[test]
fn logical_or_stops_at_the_first_true_term() {
    let mut program = Program::new();
    let unbound = program.intern("never_evaluated");

    let compound = Operation::LogicalOr {
        operations: vec![
            Operation::PushBoolean(true),
            Operation::Push(fugue::ir::PushSource {
                op: Box::new(Operation::GetVariableValue(unbound)),
                is_cons_array: false,
                is_cons_from_function: false,
            }),
        ],
    };

    let mut evaluator = Evaluator::new(&program);
    let value = evaluator.eval_value(&compound).expect("short circuit");
    assert_eq!(value, RValue::Boolean(true));
}

#[test]
fn logical_and_evaluates_later_terms_when_needed() {
    let program = Program::new();

    let compound = Operation::LogicalAnd {
        operations: vec![Operation::PushBoolean(true), Operation::PushBoolean(true)],
    };

    let mut evaluator = Evaluator::new(&program);
    let value = evaluator.eval_value(&compound).expect("full evaluation");
    assert_eq!(value, RValue::Boolean(true));
}

#[test]
fn bitwise_folds_over_integers_are_complete() {
    let program = Program::new();

    let conjunction = Operation::BitwiseAnd {
        operand_type: fugue::ir::ValueType::Integer,
        operations: vec![
            Operation::PushInteger(0b1110),
            Operation::PushInteger(0b0111),
            Operation::PushInteger(0b0110),
        ],
    };
    let disjunction = Operation::BitwiseOr {
        operand_type: fugue::ir::ValueType::Integer,
        operations: vec![
            Operation::PushInteger(0b0001),
            Operation::PushInteger(0b0100),
        ],
    };

    let mut evaluator = Evaluator::new(&program);
    assert_eq!(
        evaluator.eval_value(&conjunction).expect("fold"),
        RValue::Integer(0b0110)
    );
    assert_eq!(
        evaluator.eval_value(&disjunction).expect("fold"),
        RValue::Integer(0b0101)
    );
}

#[test]
fn scheduling_operations_surface_as_unsupported() {
    let program = Program::new();
    let mut evaluator = Evaluator::new(&program);

    let error = evaluator
        .execute(&Operation::CreateThreadPool)
        .expect_err("scheduling is the host executor's concern");
    assert_eq!(error.kind, fugue::exec::ExecErrorKind::Unsupported);
}
