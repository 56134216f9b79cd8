pub mod auth {
    pub mod config;
    pub mod oauth;
}

pub mod config;

pub mod db {
    pub mod pool;
    pub mod snapshots;
}

pub mod engine {
    pub mod activity;
    pub mod alerts;
    pub mod commands;
    pub mod session;
    pub mod state_mirror;
    pub mod sync;
}

pub mod error;

pub mod gateway {
    pub mod capabilities;
    pub mod discord;
    pub mod types;
}

pub mod web {
    pub mod app_state;
    pub mod health;
    pub mod oauth;
    pub mod router;
}
