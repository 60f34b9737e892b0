pub mod journal;
pub mod order;
pub mod tenant;
