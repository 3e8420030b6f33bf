use std::sync::Arc;

use tracing::warn;

use crate::{
    dao::dal::Dal,
    error::ServiceError,
    state::{
        SharedState, UserSession,
        state_machine::{PreferenceEvent, StoreWrite, Tracking},
    },
};

/// Execute a planned preference transition backed by its store write, then
/// push the resulting menu to the host.
pub async fn run_transition_with_menu(
    state: &SharedState,
    session: &UserSession,
    event: PreferenceEvent,
) -> Result<Tracking, ServiceError> {
    let dal = Arc::clone(state.dal());
    let ((), next) = session
        .run_transition(event, move |write| async move {
            persist(&dal, write).await
        })
        .await?;
    session.show_menu(&next);
    Ok(next)
}

async fn persist(dal: &Dal, write: StoreWrite) -> Result<(), ServiceError> {
    let (written, user_id) = match write {
        StoreWrite::Upsert(user) => {
            let user_id = user.id;
            (dal.update_user(user).await?, user_id)
        }
        StoreWrite::Delete(user_id) => (dal.delete_user(user_id).await?, user_id),
    };

    if written {
        Ok(())
    } else {
        warn!(user_id = %user_id, "preference write affected no rows; keeping previous state");
        Err(ServiceError::InvalidState(format!(
            "store write for user `{user_id}` affected no rows"
        )))
    }
}
