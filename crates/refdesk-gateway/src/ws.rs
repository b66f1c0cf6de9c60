//! WebSocket handler for the two-stage answer flow.
//!
//! Protocol per question:
//! → Client sends: {"question":"...","category":2}
//! ← {"first_ai_response_chunk":"token"} ...      (TOC-guided pass)
//! ← {"first_ai_response_end":true}
//! ← {"pdf_info":[{file_name,category,start_page,end_page,link,link_text}]}
//! ← {"manual_results":[...]} and {"faq_results":[...]}
//!     or {"warning":"検索結果が見つかりませんでした。"}
//! ← {"ai_response_chunk":"token"} ...            (grounded final pass)
//! ← {"ai_response_end":true}                     (always, even on failure)
//!
//! The connection survives a failed question; only the close frame or
//! a transport error ends the loop.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::StreamExt;
use serde_json::{Value, json};

use refdesk_core::error::{RefdeskError, Result};
use refdesk_retrieval::{describe_ranges, parse_page_ranges};

use super::server::AppState;

const WARNING_NO_RESULTS: &str = "検索結果が見つかりませんでした。";
const NO_INFORMATION: &str = "申し訳ありませんが、該当する情報が見つかりませんでした。";

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    tracing::info!("websocket client connected");
    let mut questions: u64 = 0;

    while let Some(msg) = socket.recv().await {
        match msg {
            Ok(Message::Text(text)) => {
                let request = match serde_json::from_str::<Value>(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        send_error(&mut socket, &format!("Invalid JSON: {e}")).await;
                        continue;
                    }
                };

                questions += 1;
                if let Err(e) = answer_question(&mut socket, &state, &request).await {
                    tracing::error!(error = %e, "question processing failed");
                    for message in
                        failure_messages("An error occurred while processing your request")
                    {
                        let _ = send_json(&mut socket, &message).await;
                    }
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => {
                tracing::info!("websocket client disconnected (close frame)");
                break;
            }
            Err(e) => {
                tracing::error!("websocket error: {e}");
                break;
            }
            _ => {}
        }
    }

    tracing::info!(questions, "websocket connection closed");
}

/// Drive one question through both passes.
async fn answer_question(socket: &mut WebSocket, state: &AppState, request: &Value) -> Result<()> {
    let question = request["question"].as_str().unwrap_or("").to_string();

    // A category id may arrive as a JSON number or a numeric string.
    // An absent category and an unparseable one are different caller
    // mistakes and get different messages.
    let category = match &request["category"] {
        Value::Null => {
            send_error(socket, "Category is required").await;
            return Ok(());
        }
        value => match parse_category(value) {
            Some(id) => id,
            None => {
                send_error(socket, "Invalid category").await;
                return Ok(());
            }
        },
    };

    if question.trim().is_empty() {
        send_error(socket, "Question is required").await;
        return Ok(());
    }

    tracing::info!(category, question_len = question.len(), "processing question");

    // First pass: the model reads the TOC and names page ranges.
    let toc_text = state.engine.toc_text(category).await?;
    let first_reply = stream_first_pass(socket, state, &toc_text, &question).await?;

    let ranges = parse_page_ranges(&first_reply);
    let pdf_info = match state.engine.category_name(category) {
        Some(name) => describe_ranges(&ranges, name),
        None => vec![],
    };
    send_json(socket, &json!({ "pdf_info": pdf_info })).await?;

    // Second pass: vector search over everything the TOC pass missed.
    let embedding = state.embedder.embed(&question).await?;
    let evidence = state.engine.search(&embedding, category, &ranges).await?;

    if evidence.is_empty() {
        send_json(socket, &json!({ "warning": WARNING_NO_RESULTS })).await?;
    } else {
        send_json(socket, &json!({ "manual_results": evidence.manual_results })).await?;
        send_json(socket, &json!({ "faq_results": evidence.faq_results })).await?;
    }

    // Final pass: answer from the first-pass page text plus evidence.
    let range_texts = state.engine.context_for_ranges(&ranges, category).await?;
    let has_context = !range_texts.iter().all(String::is_empty)
        || !evidence.manual_texts.is_empty()
        || !evidence.faq_texts.is_empty();

    if has_context {
        stream_final_pass(socket, state, &range_texts, &evidence, &question).await;
    } else {
        tracing::info!(category, "no relevant information found");
        let _ = send_json(socket, &json!({ "ai_response_chunk": NO_INFORMATION })).await;
        let _ = send_json(socket, &json!({ "ai_response_end": true })).await;
    }

    Ok(())
}

fn parse_category(value: &Value) -> Option<i16> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|v| i16::try_from(v).ok()),
        Value::String(s) => s.trim().parse::<i16>().ok(),
        _ => None,
    }
}

/// Stream the TOC-guided pass, relaying tokens and collecting the
/// full reply for parsing. The end marker is sent no matter how the
/// stream terminates.
async fn stream_first_pass(
    socket: &mut WebSocket,
    state: &AppState,
    toc_text: &str,
    question: &str,
) -> Result<String> {
    let system = refdesk_retrieval::prompt::first_pass_system(toc_text);

    let mut reply = String::new();
    let result = async {
        let mut tokens = state.generator.stream_chat(&system, question).await?;
        while let Some(token) = tokens.next().await {
            let token = token?;
            reply.push_str(&token);
            send_json(socket, &json!({ "first_ai_response_chunk": token })).await?;
        }
        Ok::<(), RefdeskError>(())
    }
    .await;

    let _ = send_json(socket, &json!({ "first_ai_response_end": true })).await;
    result.map(|_| reply)
}

/// Stream the grounded final pass. The end marker is sent no matter
/// how the stream terminates, so clients can always stop waiting.
async fn stream_final_pass(
    socket: &mut WebSocket,
    state: &AppState,
    range_texts: &[String],
    evidence: &refdesk_core::types::Evidence,
    question: &str,
) {
    let system = refdesk_retrieval::prompt::final_pass_system(
        range_texts,
        &evidence.manual_texts,
        &evidence.faq_texts,
    );

    let result = async {
        let mut tokens = state.generator.stream_chat(&system, question).await?;
        while let Some(token) = tokens.next().await {
            let token = token?;
            send_json(socket, &json!({ "ai_response_chunk": token })).await?;
        }
        Ok::<(), RefdeskError>(())
    }
    .await;

    if let Err(e) = result {
        tracing::error!(error = %e, "final response stream failed");
        let _ = send_json(
            socket,
            &json!({ "error": format!("Error generating final AI response: {e}") }),
        )
        .await;
    }
    let _ = send_json(socket, &json!({ "ai_response_end": true })).await;
}

/// Messages sent when a question fails mid-flight: the error itself,
/// then the answer end marker so a client waiting on stream completion
/// never hangs.
fn failure_messages(message: &str) -> [Value; 2] {
    [
        json!({ "error": message }),
        json!({ "ai_response_end": true }),
    ]
}

async fn send_json(socket: &mut WebSocket, value: &Value) -> Result<()> {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .map_err(|e| RefdeskError::Http(format!("websocket send failed: {e}")))
}

async fn send_error(socket: &mut WebSocket, message: &str) {
    let _ = send_json(socket, &json!({ "error": message })).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_accepts_number_and_numeric_string() {
        assert_eq!(parse_category(&json!(2)), Some(2));
        assert_eq!(parse_category(&json!("11")), Some(11));
        assert_eq!(parse_category(&json!(" 3 ")), Some(3));
    }

    #[test]
    fn test_category_rejects_missing_and_garbage() {
        assert_eq!(parse_category(&Value::Null), None);
        assert_eq!(parse_category(&json!("")), None);
        assert_eq!(parse_category(&json!("abc")), None);
        assert_eq!(parse_category(&json!(70000)), None);
    }

    #[test]
    fn test_failure_always_ends_the_answer_stream() {
        let messages = failure_messages("boom");
        assert_eq!(messages[0]["error"], "boom");
        assert_eq!(messages[1]["ai_response_end"], true);
    }
}
