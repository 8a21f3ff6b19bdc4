//! Reply delivery - appends an assistant reply to shared conversation history

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::Error;
use crate::storage::{Storage, StorageError};
use crate::Result;

use super::Tool;

const MAX_WRITE_ATTEMPTS: usize = 5;

/// Delivers a reply by appending it to the conversation's shared history.
///
/// History lives at `conversations/<id>.json` as a JSON array of message
/// objects. The append is a read-modify-write guarded by the storage
/// generation token; a precondition failure means another writer got
/// there first, and the whole sequence is retried from the read.
pub struct SendReplyTool {
    storage: Arc<dyn Storage>,
}

impl SendReplyTool {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn key(conversation: &str) -> String {
        format!("conversations/{conversation}.json")
    }

    fn string_arg<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a str> {
        args.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Tool(format!("missing argument: {name}")))
    }
}

#[async_trait]
impl Tool for SendReplyTool {
    fn name(&self) -> &str {
        "send_reply"
    }

    fn description(&self) -> &str {
        "Deliver a reply to the user by appending it to the conversation history."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "conversation": {
                    "type": "string",
                    "description": "Conversation identifier"
                },
                "text": {
                    "type": "string",
                    "description": "Reply text to deliver"
                }
            },
            "required": ["conversation", "text"]
        })
    }

    fn response_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "delivered": {"type": "boolean"},
                "messages": {
                    "type": "integer",
                    "description": "History length after the append"
                }
            },
            "required": ["delivered", "messages"]
        })
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Map<String, Value>> {
        let conversation = Self::string_arg(&args, "conversation")?;
        let text = Self::string_arg(&args, "text")?;
        let key = Self::key(conversation);

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (mut history, generation) = match self.storage.read(&key).await {
                Ok((data, generation)) => {
                    (serde_json::from_slice::<Vec<Value>>(&data)?, Some(generation))
                }
                Err(StorageError::NotFound(_)) => (Vec::new(), None),
                Err(err) => return Err(err.into()),
            };

            history.push(json!({
                "role": "assistant",
                "text": text,
                "timestamp": Local::now().to_rfc3339(),
            }));

            let data = serde_json::to_vec(&history)?;
            match self
                .storage
                .write(&key, "application/json", &data, generation.as_ref())
                .await
            {
                Ok(_) => {
                    let mut result = Map::new();
                    result.insert("delivered".to_string(), Value::Bool(true));
                    result.insert("messages".to_string(), json!(history.len()));
                    return Ok(result);
                }
                Err(StorageError::PreconditionFailed(_)) => {
                    debug!(
                        "Reply append to {} lost the race (attempt {}), retrying",
                        key, attempt
                    );
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(Error::Tool(format!(
            "could not append reply to {key} after {MAX_WRITE_ATTEMPTS} attempts"
        )))
    }
}
