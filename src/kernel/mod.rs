pub mod audio;
pub mod consensus;
pub mod fusion;
pub mod gate;
pub mod interaction;
pub mod mood;
pub mod pipeline;
pub mod reactor;
pub mod regulation;
pub mod reinforcement;
pub mod session;
pub mod strategy;
pub mod validate;
