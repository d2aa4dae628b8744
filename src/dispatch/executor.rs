//! Runs validated commands against a live session.

use crate::dispatch::descriptor::{Command, Records};
use crate::dispatch::outcome::{id_to_string, normalize_document, Outcome, Success};
use crate::error::GatewayError;
use crate::store::{Namespace, Session, StoreError};

/// Execute `command` on `session`.
///
/// Update and delete affect every matching record. Engine failures become
/// `Execution` errors carrying the engine message.
pub async fn execute(session: &dyn Session, command: Command) -> Outcome {
    tracing::debug!(
        operation = %command.kind(),
        namespace = %command.namespace(),
        "Executing operation"
    );

    match command {
        Command::Create { ns } => create(session, ns).await,
        Command::Find { ns, filter } => {
            let records = session.find(&ns, filter).await.map_err(execution_failed)?;
            Ok(Success::Found(
                records.into_iter().map(normalize_document).collect(),
            ))
        }
        Command::Insert { ns, records: Records::One(record) } => {
            let id = session
                .insert_one(&ns, record)
                .await
                .map_err(execution_failed)?;
            Ok(Success::InsertedOne(id_to_string(id)))
        }
        Command::Insert { ns, records: Records::Many(records) } => {
            let ids = session
                .insert_many(&ns, records)
                .await
                .map_err(execution_failed)?;
            Ok(Success::InsertedMany(ids.into_iter().map(id_to_string).collect()))
        }
        Command::Update { ns, filter, update } => {
            let counts = session
                .update_many(&ns, filter, update)
                .await
                .map_err(execution_failed)?;
            Ok(Success::Updated(counts))
        }
        Command::Delete { ns, filter } => {
            let deleted = session
                .delete_many(&ns, filter)
                .await
                .map_err(execution_failed)?;
            Ok(Success::Deleted(deleted))
        }
    }
}

/// Create the collection unless it already exists.
async fn create(session: &dyn Session, ns: Namespace) -> Outcome {
    let existing = session
        .list_collection_names(&ns.database)
        .await
        .map_err(execution_failed)?;

    let created = if existing.contains(&ns.collection) {
        false
    } else {
        session.create_collection(&ns).await.map_err(execution_failed)?;
        true
    };

    Ok(Success::Created {
        collection: ns.collection,
        created,
    })
}

fn execution_failed(err: StoreError) -> GatewayError {
    GatewayError::Execution(err.0)
}
