pub mod actuator;
pub mod renderer;

use std::sync::Arc;

pub use actuator::{Actuator, ConsoleActuator, Playback};
pub use renderer::{compose_prompt, LlamaRenderer, Renderer, TemplateRenderer};

/// External collaborators the reactor drives.
#[derive(Clone)]
pub struct Services {
    pub renderer: Arc<dyn Renderer>,
    pub actuator: Arc<dyn Actuator>,
}
