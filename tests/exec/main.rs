mod common;
mod scalar_flow;
mod short_circuit;
