pub mod cluster;
pub mod kubernetes;
#[cfg(test)]
pub mod mock;
