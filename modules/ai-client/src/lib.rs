pub mod client;
pub mod schema;

pub use client::Claude;
pub use schema::StructuredOutput;
