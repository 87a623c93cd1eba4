pub mod docker;
pub mod runtime;
pub mod state;
pub mod types;

pub use runtime::Runtime;
pub use state::valid_state_transition;
pub use types::{
    Action, ContainerConfig, DockerResult, RestartPolicy, RuntimeError, State, Task, TaskEvent,
};
