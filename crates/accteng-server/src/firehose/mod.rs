pub mod emit;
pub mod events;
pub mod relay;
pub mod sequencer;
pub mod stream;
pub mod wire;
