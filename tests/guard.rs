use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use aclguard::ability::factory::{AbilityFactory, FnRuleDefinition};
use aclguard::ability::{Conditions, Resource, RuleBuilder, READ};
use aclguard::config::{CommonConfig, PathSet};
use aclguard::context::{HttpContext, Invocation, QueryContext, SocketClient};
use aclguard::error::GuardError;
use aclguard::guard::config::GuardConfig;
use aclguard::guard::factory::GuardFactory;
use aclguard::guard::{AclGuard, Decision, DenyReason};
use aclguard::hook::SubjectHook;
use aclguard::principal::Principal;
use actix_web::http::header::HeaderValue;
use actix_web::test::TestRequest;
use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};

const CONFIG: &str = r#"
[[operations]]
name = "getDocument"
action = "read"
subject = "Document"
hook = "docHook"

[[operations]]
name = "deleteDocument"
action = "delete"
subject = "Document"
hook = "docHook"

[[operations]]
name = "listArticles"
action = "read"
subject = "Article"

[policy]
anonymous = [{ action = "read", subject = "Article" }]
authenticated = [
  { action = "read", subject = "Article" },
  { action = "read", subject = "Document", conditions = { ownerId = "${principal.id}" } },
]

[[policy.roles]]
name = "editor"
rules = [{ action = "manage", subject = "Document" }]
"#;

/// Documents by id, standing in for storage.
struct DocumentHook {
    documents: HashMap<String, Value>,
}

impl DocumentHook {
    fn new() -> Self {
        let mut documents = HashMap::new();
        documents.insert("d1".to_string(), json!({"id": "d1", "ownerId": "u1"}));
        documents.insert("d2".to_string(), json!({"id": "d2", "ownerId": "u2"}));
        Self { documents }
    }
}

#[async_trait]
impl SubjectHook for DocumentHook {
    async fn run(&self, args: &Value, _principal: Option<&Principal>) -> Result<Option<Value>> {
        let id = args
            .get("id")
            .or_else(|| args.get("input").and_then(|input| input.get("id")))
            .and_then(Value::as_str);
        Ok(id.and_then(|id| self.documents.get(id)).cloned())
    }
}

fn build_guard() -> AclGuard {
    let mut cfg: GuardConfig = toml::from_str(CONFIG).unwrap();
    let ps = PathSet::new(Some(PathBuf::from("testdata"))).unwrap();
    cfg.complete(&ps).unwrap();

    let mut factory = GuardFactory::new(cfg);
    factory.with_hook("docHook", Arc::new(DocumentHook::new()));
    factory.build_guard().unwrap()
}

static GUARD: Lazy<AclGuard> = Lazy::new(build_guard);

fn principal_header(id: &str) -> String {
    json!({"id": id}).to_string()
}

fn http(principal: Option<&str>, id: &str) -> HttpContext {
    let mut ctx = HttpContext::new().with_param("id", id);
    if let Some(principal) = principal {
        ctx = ctx.with_header("x-principal", principal_header(principal));
    }
    ctx
}

#[tokio::test]
async fn test_owner_scenario() {
    let mut ctx = http(Some("u1"), "d1");
    let auth = GUARD
        .authorize("getDocument", Invocation::Http(&mut ctx))
        .await
        .unwrap();
    assert_eq!(auth.decision, Decision::Allow);
    let subject = ctx.attachments.subject("Document").unwrap();
    assert_eq!(subject.get("ownerId"), Some(&json!("u1")));

    let mut ctx = http(Some("u1"), "d2");
    let auth = GUARD
        .authorize("getDocument", Invocation::Http(&mut ctx))
        .await
        .unwrap();
    assert!(matches!(auth.decision, Decision::Deny(DenyReason::Forbidden(_))));
}

#[tokio::test]
async fn test_missing_subject_always_denies() {
    // The editor may manage every document, but there is none to act on
    let mut ctx = HttpContext::new()
        .with_header("x-principal", r#"{"id": "u1", "roles": ["editor"]}"#)
        .with_param("id", "d9");
    let auth = GUARD
        .authorize("deleteDocument", Invocation::Http(&mut ctx))
        .await
        .unwrap();
    assert_eq!(auth.decision, Decision::Deny(DenyReason::SubjectNotFound));
    assert!(auth.ability.unwrap().can("delete", "Document"));

    let mut ctx = HttpContext::new()
        .with_header("x-principal", r#"{"id": "u1", "roles": ["editor"]}"#)
        .with_param("id", "d2");
    assert!(GUARD
        .can_activate("deleteDocument", Invocation::Http(&mut ctx))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_no_metadata_always_allows() {
    let principals = [None, Some(json!({"id": "u1"}))];
    for principal in principals {
        let principal = principal.map(|p| Principal::from_value(p).unwrap());

        let mut client = SocketClient::new("c1");
        client.user = principal.clone();
        let data = json!({});
        let invocation = Invocation::Socket {
            client: &mut client,
            data: &data,
        };
        assert!(GUARD.can_activate("listAll", invocation).await.unwrap());

        let mut ctx = HttpContext::new();
        ctx.user = principal.clone();
        assert!(GUARD
            .can_activate("listAll", Invocation::Http(&mut ctx))
            .await
            .unwrap());

        let mut ctx = QueryContext::new();
        ctx.user = principal.clone();
        assert!(GUARD
            .can_activate("listAll", Invocation::Query(&mut ctx))
            .await
            .unwrap());

        let mut context = Map::new();
        if let Some(ref principal) = principal {
            context.insert("auth".to_string(), principal.to_value());
        }
        let invocation = Invocation::Rpc {
            context: &context,
            data: &data,
        };
        assert!(GUARD.can_activate("listAll", invocation).await.unwrap());

        assert!(GUARD
            .can_activate("listAll", Invocation::Unknown("kafka"))
            .await
            .unwrap());
    }
}

#[tokio::test]
async fn test_malformed_principal() {
    let mut ctx = HttpContext::new()
        .with_header("x-principal", "{not valid json")
        .with_param("id", "d1");
    let err = GUARD
        .authorize("getDocument", Invocation::Http(&mut ctx))
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::MalformedPrincipal { .. }));
    assert!(err.is_authentication());
}

#[tokio::test]
async fn test_blank_principal_header() {
    // A public operation still refuses a principal header it cannot read
    for value in ["", "   "] {
        let mut ctx = HttpContext::new().with_header("x-principal", value);
        let err = GUARD
            .authorize("listArticles", Invocation::Http(&mut ctx))
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::MalformedPrincipal { .. }));
    }
}

#[tokio::test]
async fn test_actix_principal_headers() {
    let value = HeaderValue::from_bytes(r#"{"id": "u2", "name": "Zoë"}"#.as_bytes()).unwrap();
    let req = TestRequest::get()
        .insert_header(("x-principal", value))
        .param("id", "d2")
        .to_http_request();
    let mut ctx = HttpContext::from_request(&req);
    let auth = GUARD
        .authorize("getDocument", Invocation::Http(&mut ctx))
        .await
        .unwrap();
    assert!(auth.decision.is_allowed());
    assert_eq!(auth.principal.unwrap().get("name"), Some(&json!("Zoë")));

    let value = HeaderValue::from_bytes(b"{\"id\": \"u2\xfe\"}").unwrap();
    let req = TestRequest::get()
        .insert_header(("x-principal", value))
        .to_http_request();
    let mut ctx = HttpContext::from_request(&req);
    let err = GUARD
        .authorize("listArticles", Invocation::Http(&mut ctx))
        .await
        .unwrap_err();
    assert!(err.is_authentication());

    let req = TestRequest::get()
        .append_header(("x-principal", principal_header("u1")))
        .append_header(("x-principal", principal_header("u2")))
        .param("id", "d2")
        .to_http_request();
    let mut ctx = HttpContext::from_request(&req);
    let err = GUARD
        .authorize("getDocument", Invocation::Http(&mut ctx))
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::MalformedPrincipal { .. }));
}

#[tokio::test]
async fn test_query_transport() {
    let mut ctx = QueryContext::new()
        .with_arg("input", json!({"id": "d1", "title": "new title"}))
        .with_request(HttpContext::new().with_header("x-principal", principal_header("u1")));
    let auth = GUARD
        .authorize("getDocument", Invocation::Query(&mut ctx))
        .await
        .unwrap();
    assert!(auth.decision.is_allowed());

    let req = ctx.req.unwrap();
    assert_eq!(req.attachments.auth().unwrap().id(), Some("u1"));
    assert!(req.attachments.subject("Document").is_some());
}

#[tokio::test]
async fn test_rpc_transport() {
    let mut context = Map::new();
    context.insert("auth".to_string(), json!({"id": "u2"}));
    let data = json!({"id": "d2"});
    let auth = GUARD
        .authorize(
            "getDocument",
            Invocation::Rpc {
                context: &context,
                data: &data,
            },
        )
        .await
        .unwrap();
    assert!(auth.decision.is_allowed());
    assert_eq!(auth.principal.unwrap().id(), Some("u2"));
    assert_eq!(auth.subject.unwrap().get("id"), Some(&json!("d2")));
}

#[tokio::test]
async fn test_socket_requests_are_scoped() {
    let mut client = SocketClient::new("c1");
    client.user = Some(Principal::from_value(json!({"id": "u1"})).unwrap());

    let data = json!({"id": "d1"});
    let allowed = GUARD
        .can_activate(
            "getDocument",
            Invocation::Socket {
                client: &mut client,
                data: &data,
            },
        )
        .await
        .unwrap();
    assert!(allowed);
    assert!(client.attachments.subject("Document").is_some());

    // The next message on the same connection starts from a clean target
    let data = json!({});
    let allowed = GUARD
        .can_activate(
            "listArticles",
            Invocation::Socket {
                client: &mut client,
                data: &data,
            },
        )
        .await
        .unwrap();
    assert!(allowed);
    assert!(client.attachments.subject("Document").is_none());
    assert_eq!(client.attachments.auth().unwrap().id(), Some("u1"));
}

#[tokio::test]
async fn test_actix_request() {
    let req = TestRequest::get()
        .uri("/documents/d2")
        .insert_header(("X-Principal", principal_header("u2")))
        .param("id", "d2")
        .to_http_request();
    let mut ctx = HttpContext::from_request(&req);
    assert!(GUARD
        .can_activate("getDocument", Invocation::Http(&mut ctx))
        .await
        .unwrap());

    let req = TestRequest::get().uri("/articles").to_http_request();
    let mut ctx = HttpContext::from_request(&req);
    let auth = GUARD
        .authorize("listArticles", Invocation::Http(&mut ctx))
        .await
        .unwrap();
    assert!(auth.decision.is_allowed());
    assert!(auth.principal.is_none());
}

#[tokio::test]
async fn test_concurrent_invocations() {
    let mut handles = Vec::new();
    for i in 0..64 {
        handles.push(tokio::spawn(async move {
            let (user, doc) = match i % 4 {
                0 => ("u1", "d1"),
                1 => ("u1", "d2"),
                2 => ("u2", "d2"),
                _ => ("u2", "d1"),
            };
            let mut ctx = http(Some(user), doc);
            let auth = GUARD
                .authorize("getDocument", Invocation::Http(&mut ctx))
                .await
                .unwrap();
            let attached = ctx.attachments.auth().and_then(Principal::id).map(String::from);
            (i, auth.decision.is_allowed(), attached)
        }));
    }

    for handle in handles {
        let (i, allowed, attached) = handle.await.unwrap();
        assert_eq!(allowed, i % 4 == 0 || i % 4 == 2, "invocation {i}");
        let expect = if i % 4 < 2 { "u1" } else { "u2" };
        assert_eq!(attached.as_deref(), Some(expect));
    }
}

#[tokio::test]
async fn test_type_check_ignores_unrelated_rules() {
    let principal = Principal::from_value(json!({"id": "u1"})).unwrap();
    let base = |builder: &mut RuleBuilder, _: Option<&Principal>| -> Result<()> {
        builder.can("read", "Article");
        Ok(())
    };
    let noisy = |builder: &mut RuleBuilder, _: Option<&Principal>| -> Result<()> {
        builder.can("read", "Article");
        builder.cannot("read", "Document");
        builder
            .can("update", "Comment")
            .when(Conditions::new().eq("authorId", "u1"));
        builder.cannot("manage", "Invoice");
        Ok(())
    };

    let first = AbilityFactory::new(Arc::new(FnRuleDefinition::new(base)))
        .build(Some(&principal))
        .await
        .unwrap();
    let second = AbilityFactory::new(Arc::new(FnRuleDefinition::new(noisy)))
        .build(Some(&principal))
        .await
        .unwrap();
    assert_eq!(first.can("read", "Article"), second.can("read", "Article"));
    assert!(second.can("read", "Article"));
}

#[tokio::test]
async fn test_later_rules_win() {
    let definition = |builder: &mut RuleBuilder, _: Option<&Principal>| -> Result<()> {
        builder.can(READ, "Document");
        builder
            .cannot(READ, "Document")
            .when(Conditions::new().eq("archived", true));
        builder
            .can(READ, "Document")
            .when(Conditions::new().eq("public", true));
        Ok(())
    };
    let ability = AbilityFactory::new(Arc::new(FnRuleDefinition::new(definition)))
        .build(None)
        .await
        .unwrap();

    let plain = Resource::new("Document", json!({"archived": false}));
    let archived = Resource::new("Document", json!({"archived": true}));
    let archived_public =
        Resource::new("Document", json!({"archived": true, "public": true}));
    assert!(ability.can("read", &plain));
    assert!(!ability.can("read", &archived));
    assert!(ability.can("read", &archived_public));
}
