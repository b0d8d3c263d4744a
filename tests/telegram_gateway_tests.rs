//! Telegram gateway tests against a mock Bot API

use serde_json::json;
use watchdesk::error::AppError;
use watchdesk::gateway::{NotificationGateway, TelegramGateway};
use watchdesk::models::{Destination, MessageRef};
use watchdesk::workflow::Keyboard;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123:abc";

fn gateway(server: &MockServer) -> TelegramGateway {
    TelegramGateway::new(server.uri(), TOKEN)
}

fn sent_message(chat_id: i64, message_id: i64) -> serde_json::Value {
    json!({
        "ok": true,
        "result": {
            "message_id": message_id,
            "date": 1700000000,
            "chat": {"id": chat_id, "type": "supergroup", "title": "SDO"},
            "text": "x"
        }
    })
}

#[tokio::test]
async fn test_send_text_returns_message_ref() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_partial_json(json!({
            "chat_id": -100,
            "text": "<b>hello</b>",
            "parse_mode": "HTML"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(sent_message(-100, 55)))
        .expect(1)
        .mount(&server)
        .await;

    let message = gateway(&server)
        .send_text(Destination::Group(-100), "<b>hello</b>")
        .await
        .unwrap();
    assert_eq!(message, MessageRef::new(-100, 55));
}

#[tokio::test]
async fn test_send_with_actions_serializes_keyboard() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_partial_json(json!({
            "reply_markup": {
                "inline_keyboard": [[
                    {"text": "Approve", "callback_data": "approve:1:9"},
                    {"text": "Reject", "callback_data": "reject:1:9"}
                ]]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(sent_message(-100, 56)))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server)
        .send_text_with_actions(Destination::Group(-100), "decide", &Keyboard::decision(9))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_api_error_is_gateway_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        })))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .send_text(Destination::User(501), "hi")
        .await
        .unwrap_err();
    match err {
        AppError::Gateway(message) => {
            assert!(message.contains("blocked by the user"));
            assert!(!message.contains(TOKEN));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_edit_not_modified_is_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bot123:abc/editMessageReplyMarkup"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message is not modified"
        })))
        .mount(&server)
        .await;

    gateway(&server)
        .edit_actions(MessageRef::new(-100, 5), Some(&Keyboard::decision(1)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_edit_missing_message_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bot123:abc/editMessageReplyMarkup"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message to edit not found"
        })))
        .mount(&server)
        .await;

    let result = gateway(&server)
        .edit_actions(MessageRef::new(-100, 5), None)
        .await;
    assert!(matches!(result, Err(AppError::Gateway(_))));
}

#[tokio::test]
async fn test_delete_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bot123:abc/deleteMessage"))
        .and(body_partial_json(json!({"chat_id": 501, "message_id": 77})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server)
        .delete_message(MessageRef::new(501, 77))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_resolve_display_name() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bot123:abc/getChat"))
        .and(body_partial_json(json!({"chat_id": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"id": 1, "type": "private", "username": "alice", "first_name": "Alice"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/getChat"))
        .and(body_partial_json(json!({"chat_id": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"id": 2, "type": "private", "first_name": "Bob"}
        })))
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    assert_eq!(
        gateway.resolve_display_name(1).await.unwrap(),
        Some("@alice".to_string())
    );
    assert_eq!(
        gateway.resolve_display_name(2).await.unwrap(),
        Some("Bob".to_string())
    );
}

#[tokio::test]
async fn test_answer_callback() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bot123:abc/answerCallbackQuery"))
        .and(body_partial_json(json!({"callback_query_id": "cbq-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server).answer_action("cbq-1").await.unwrap();
}

#[tokio::test]
async fn test_unreachable_server_hides_token() {
    let gateway = TelegramGateway::new("http://127.0.0.1:1", TOKEN);
    let err = gateway
        .send_text(Destination::User(1), "hi")
        .await
        .unwrap_err();
    assert!(!err.to_string().contains(TOKEN));
}
