mod config;
mod cumulative_ack;
mod sim_time;
mod simulator;
mod support;
