use crate::{
    db::{DbPool, OrmConn},
    notify::NotificationHub,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub hub: NotificationHub,
}
