mod account;
mod helpers;
mod profile;
mod stats;
mod transfer;
mod weight;

pub(crate) use account::{cmd_login, cmd_logout, cmd_whoami};
pub(crate) use helpers::json_error;
pub(crate) use profile::{
    cmd_goal_clear, cmd_goal_set, cmd_goal_show, cmd_height_clear, cmd_height_set,
    cmd_height_show, cmd_units,
};
pub(crate) use stats::{cmd_chart, cmd_stats};
pub(crate) use transfer::{cmd_export, cmd_import};
pub(crate) use weight::{cmd_delete, cmd_history, cmd_log};
