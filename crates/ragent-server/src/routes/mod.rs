pub mod reply;
pub mod search;

#[cfg(test)]
pub mod testing;

use crate::state::AppState;
use axum::Router;

pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(reply::routes(state.clone()))
        .merge(search::routes(state))
}
