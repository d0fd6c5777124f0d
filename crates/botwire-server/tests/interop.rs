// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Full round trip: a bot hosted on a real listener, consumed with the
//! protocol client.

use async_trait::async_trait;
use botwire_core::types::{
    BotEvent, PartialResponse, ProtocolMessage, QueryRequest, Role, PROTOCOL_VERSION,
};
use botwire_client::{BotClient, StreamOptions};
use botwire_server::{Bot, BotAppBuilder, BotOptions, EventStream};
use futures::StreamExt;

const KEY: &str = "0123456789abcdef0123456789abcdef";

struct Greeter;

#[async_trait]
impl Bot for Greeter {
    async fn get_response(&self, request: QueryRequest) -> EventStream {
        let user = request
            .query
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        Box::pin(futures::stream::iter(vec![
            Ok(PartialResponse::text("hello, ").into()),
            Ok(PartialResponse::text(user).into()),
            Ok(PartialResponse::suggested_reply("and you?").into()),
        ]))
    }
}

async fn host(bot: impl Bot, options: BotOptions) -> String {
    let app = BotAppBuilder::new()
        .allow_without_key(true)
        .bot_with_options("/greeter", bot, options)
        .build()
        .unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

fn request(content: &str) -> QueryRequest {
    QueryRequest {
        version: PROTOCOL_VERSION.to_string(),
        query: vec![ProtocolMessage::new(Role::User, content)],
        user_id: "u1".to_string(),
        conversation_id: "c1".to_string(),
        message_id: "m1".to_string(),
        metadata: String::new(),
        api_key: String::new(),
        access_key: String::new(),
        temperature: 0.7,
        skip_system_prompt: false,
        logit_bias: Default::default(),
        stop_sequences: Vec::new(),
    }
}

#[tokio::test]
async fn client_reads_a_hosted_bot_stream() {
    let base = host(Greeter, BotOptions::default()).await;
    let client = BotClient::new().with_base_url(base);

    let events: Vec<_> = client
        .stream_request(request("world"), "greeter", StreamOptions::default())
        .collect()
        .await;
    let texts: Vec<String> = events
        .into_iter()
        .map(|event| match event.unwrap() {
            BotEvent::Partial(partial) => partial.text,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(texts, vec!["hello, ", "world", "and you?"]);
}

#[tokio::test]
async fn final_response_assembles_chunks() {
    let base = host(Greeter, BotOptions::default()).await;
    let client = BotClient::new().with_base_url(base);

    let text = client
        .get_final_response(request("world"), "greeter", StreamOptions::default())
        .await
        .unwrap();
    assert_eq!(text, "hello, world");
}

#[tokio::test]
async fn settings_round_trip() {
    let base = host(Greeter, BotOptions::default()).await;
    let client = BotClient::new().with_base_url(base);

    let settings = client.fetch_settings("greeter", None).await.unwrap();
    assert!(settings.expand_text_attachments);
    assert!(!settings.allow_attachments);
}

#[tokio::test]
async fn keyed_bot_accepts_matching_bearer_token() {
    let base = host(Greeter, BotOptions::with_access_key(KEY)).await;
    let client = BotClient::new().with_base_url(base);

    let options = StreamOptions {
        api_key: Some(KEY.to_string()),
        ..StreamOptions::default()
    };
    let text = client
        .get_final_response(request("world"), "greeter", options)
        .await
        .unwrap();
    assert_eq!(text, "hello, world");
}
