pub mod access;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod db;
pub mod demo;
pub mod domain;
pub mod duration;
pub mod error;
pub mod lifecycle;
pub mod normalize;
pub mod repo;
pub mod resolve;
pub mod status;
pub mod timeline;
pub mod validate;
pub mod workspace;
