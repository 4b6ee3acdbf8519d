pub mod channels;
pub mod conductor;
pub mod config;
pub mod llm;
pub mod web;

#[cfg(test)]
pub(crate) mod test_support;
