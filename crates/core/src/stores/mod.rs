pub mod flat;

pub use flat::FlatL2Index;
