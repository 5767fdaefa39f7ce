use fugue::builder::SemanticBuilder;
use fugue::exec::{Evaluator, Signal};
use fugue::ir::{Block, FunctionKind, Program};

/// Builds a program with an entrypoint body assembled by `body`.
pub fn program_with_body(body: impl FnOnce(&mut SemanticBuilder)) -> Program {
    let mut builder = SemanticBuilder::new();
    builder
        .register_function_name("entrypoint")
        .expect("function name");
    builder.enter_block_preparse();
    builder.exit_block_preparse().expect("preparse exit");

    builder
        .register_function_body("entrypoint")
        .expect("function body");
    builder.enter_block().expect("body entry");
    body(&mut builder);
    builder.exit_block().expect("body exit");

    let (program, diagnostics) = builder.finish();
    assert!(
        diagnostics.is_empty(),
        "unexpected diagnostics: {diagnostics:?}"
    );
    program
}

/// The entrypoint's body block.
pub fn entrypoint_body(program: &Program) -> &Block {
    let name = program
        .strings
        .lookup("entrypoint")
        .expect("entrypoint was interned");
    let function = program
        .scopes
        .function_id(program.global_scope, name)
        .expect("entrypoint is declared");
    match program.functions.get(function) {
        Some(FunctionKind::User(function)) => {
            function.body.as_ref().expect("entrypoint has a body")
        }
        _ => panic!("entrypoint is not a user function"),
    }
}

/// Runs the entrypoint to completion and returns the debug output.
pub fn run_entrypoint(program: &Program) -> String {
    let mut evaluator = Evaluator::new(program);
    evaluator.run_global_init().expect("global init");
    let signal = evaluator
        .run_block(entrypoint_body(program))
        .expect("entrypoint runs");
    assert!(matches!(signal, Signal::Normal | Signal::Return));
    evaluator.ctx.output.clone()
}
