pub mod locks;
pub mod reconcile;
pub mod sweeper;
