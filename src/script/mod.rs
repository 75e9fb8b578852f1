pub mod generator;

pub use generator::{
    CopyInstruction, DEFAULT_DECODER, DecodePlan, DecodeScript, GeneratorConfig, destination_for,
    generate, retained,
};
