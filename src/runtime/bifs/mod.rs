//! Built-in scalar functions. Map-valued functions live in
//! [`crate::runtime::xfuncs`].

pub mod arithmetic;
pub mod matching;
pub mod strings;
pub mod time;
pub mod types;
