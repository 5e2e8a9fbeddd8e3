mod client;
mod mapper;
mod mutate;
mod pulls;

pub use client::GitHubClient;
pub use mutate::{validate_repo_path, BranchMutator};
pub use pulls::PullRequestCreator;
