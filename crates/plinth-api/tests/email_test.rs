//! HTTP mailer against a mock relay.

use plinth_api::email::{verification_email, EmailMessage, HttpMailer, Mailer};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn message() -> EmailMessage {
    EmailMessage {
        to: "reader@example.com".to_string(),
        subject: "Welcome".to_string(),
        text: "Hello there".to_string(),
    }
}

#[tokio::test]
async fn posts_message_with_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(serde_json::json!({
            "from": "no-reply@example.com",
            "to": "reader@example.com",
            "subject": "Welcome",
            "text": "Hello there",
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(
        format!("{}/send", server.uri()),
        Some("secret".to_string()),
        "no-reply@example.com",
        5,
    )
    .expect("mailer");

    mailer.send(&message()).await.unwrap();
}

#[tokio::test]
async fn relay_error_status_is_an_email_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(server.uri(), None, "no-reply@example.com", 5).expect("mailer");
    let err = mailer.send(&message()).await.unwrap_err();

    assert!(matches!(err, plinth_core::Error::Email(_)));
    let text = err.to_string();
    assert!(text.contains("503"), "{}", text);
    assert!(text.contains("overloaded"), "{}", text);
}

#[tokio::test]
async fn unreachable_relay_is_an_email_error() {
    let mailer = HttpMailer::new("http://127.0.0.1:9/send", None, "no-reply@example.com", 2)
        .expect("mailer");
    let err = mailer.send(&message()).await.unwrap_err();
    assert!(matches!(err, plinth_core::Error::Email(_)));
}

#[tokio::test]
async fn templates_render_through_the_relay() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let msg = verification_email("https://blog.example.com", "a@example.com", "Ada", "tok123");
    assert!(msg.text.contains("https://blog.example.com/verify-email?token=tok123"));

    let mailer = HttpMailer::new(server.uri(), None, "no-reply@example.com", 5).expect("mailer");
    mailer.send(&msg).await.unwrap();
}
