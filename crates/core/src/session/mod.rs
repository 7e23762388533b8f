pub mod controller;
pub mod error;
pub mod message;
#[cfg(test)]
mod test_support;
pub mod worker;
