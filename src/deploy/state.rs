// ABOUTME: Pipeline state types for the type state pattern.
// ABOUTME: Each state carries only what later steps need, so out-of-order steps cannot compile.

use crate::runtime::StartedContainer;

/// Deployment row opened; nothing fetched yet.
/// Available actions: `fetch_source()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Initialized;

/// Working tree is at the site's branch head.
/// Available actions: `build_image()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Cloned;

/// Image built from the working tree.
/// Available actions: `start_container()`
#[derive(Debug, Clone)]
pub struct Built {
    pub image: String,
}

/// New container running; not yet trusted.
/// Available actions: `health_check()`, `rollback()`
#[derive(Debug, Clone)]
pub struct Started {
    pub container: StartedContainer,
}

/// New container answered its health probe.
/// Available actions: `switch()`
#[derive(Debug, Clone)]
pub struct HealthChecked {
    pub container: StartedContainer,
}

/// Traffic now reaches the new container.
/// Available actions: `finish()`
#[derive(Debug, Clone)]
pub struct Switched {
    pub container: StartedContainer,
}

/// Site record updated and deployment closed.
#[derive(Debug, Clone)]
pub struct Completed {
    pub container: StartedContainer,
}
