// Library for tests to access modules

pub mod archive;
pub mod completion;
pub mod config;
pub mod datastore;
pub mod error;
pub mod models;
pub mod poller;
pub mod report;
pub mod routes;
pub mod version;
