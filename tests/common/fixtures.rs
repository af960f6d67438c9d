//! Feed payload builders

use serde_json::{Value, json};

/// Creation time `offset` seconds after 2020-01-12T08:00:00Z, in the feed's format
pub fn created_at(offset: u32) -> String {
    format!(
        "2020-01-12T08:{:02}:{:02}.000000Z",
        (offset / 60) % 60,
        offset % 60
    )
}

/// Minimal post JSON
pub fn post(id: &str, username: &str, offset: u32) -> Value {
    json!({
        "id": id,
        "user": { "username": username, "screenName": format!("{username} display") },
        "createdAt": created_at(offset),
        "content": format!("content of {id}"),
        "pictures": []
    })
}

/// Merge `extra` fields into a post
pub fn with(mut post: Value, extra: Value) -> Value {
    if let (Some(target), Some(source)) = (post.as_object_mut(), extra.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
    post
}

/// Feed list response wrapping `posts` (newest first)
pub fn page(posts: Vec<Value>) -> Value {
    json!({ "data": posts })
}

/// Successful Bot API response
pub fn bot_ok() -> Value {
    json!({ "ok": true, "result": {} })
}
