pub mod arq;
pub mod config;
pub mod harq;
pub mod link;
pub mod probe;
pub mod sim;
pub mod timer;
pub mod viz;

#[cfg(test)]
mod test;
