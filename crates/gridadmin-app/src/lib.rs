// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod backend;
pub mod columns;
pub mod console;
pub mod forms;
pub mod grid;
pub mod ids;
pub mod model;
pub mod reconcile;
pub mod state;

pub use backend::*;
pub use columns::*;
pub use console::*;
pub use forms::*;
pub use grid::*;
pub use ids::*;
pub use model::*;
pub use reconcile::*;
pub use state::*;
