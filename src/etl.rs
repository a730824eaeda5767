//! The migration engine.
//!
//! A run is driven by the [`job::Orchestrator`], which interprets a fixed
//! plan of steps. Schema steps go through [`schema::SchemaPreparer`];
//! migrate steps compose [`reader`] → [`resolver`] → [`writer`] in
//! [`step::MigrationStep`], translating ids through the run's
//! [`mapper::IdMapper`].

pub mod documents;
pub mod job;
pub mod mapper;
pub mod reader;
pub mod resolver;
pub mod schema;
pub mod step;
pub mod types;
pub mod writer;
