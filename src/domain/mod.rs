// Domain layer - Series, samples and buffers, free of I/O
pub mod buffer;
pub mod sample;
pub mod series;
pub mod statistics;
pub mod viewport;
