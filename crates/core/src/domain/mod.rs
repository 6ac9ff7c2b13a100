pub mod concepts;
pub mod dashboard;
pub mod ladder;
pub mod promotion;
pub mod sector;
pub mod sentiment;
pub mod snapshot;
