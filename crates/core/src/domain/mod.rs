pub mod analyst;
pub mod idea;
