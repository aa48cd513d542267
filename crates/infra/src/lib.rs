//! Infrastructure layer: configuration, Postgres, repositories, background jobs,
//! and the services behind the admin API and the crowdfunding schedule.

pub mod admin;
pub mod config;
pub mod crowdfunding;
pub mod db;
pub mod jobs;
pub mod repository;

#[cfg(test)]
mod testing;
