pub mod task;
pub mod task_assignment;
pub mod team;
pub mod team_member;
pub mod user;
