//! Serving the route table through axum.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use ferrous_nest::axum_integration::AxumTransport;
use ferrous_nest::controller::{ControllerDef, Param, RouteDef};
use ferrous_nest::http::HttpError;
use ferrous_nest::pipeline::ParseIntPipe;
use ferrous_nest::{Application, DiResult, Injectable, Injected, Module, ModuleDef};
use serde_json::{json, Value};
use tower::ServiceExt;

struct FilesController;

#[async_trait]
impl Injectable for FilesController {
    async fn construct(_: Injected) -> DiResult<Self> {
        Ok(FilesController)
    }
}

struct FilesModule;

impl Module for FilesModule {
    fn define() -> ModuleDef {
        ModuleDef::new::<Self>().controller(
            ControllerDef::new::<FilesController>("files")
                .route(
                    RouteDef::get(":id")
                        .param(Param::path("id").pipe(ParseIntPipe::default()))
                        .param(Param::query("format"))
                        .header("x-served-by", "files")
                        .handle("find", |_: Arc<FilesController>, args| async move {
                            let id: i64 = args.arg(0)?;
                            let format: Option<String> = args.arg(1)?;
                            Ok::<_, HttpError>(json!({ "id": id, "format": format }))
                        }),
                )
                .route(
                    RouteDef::get("raw/*")
                        .param(Param::path("*"))
                        .handle("raw", |_: Arc<FilesController>, args| async move {
                            let rest: String = args.arg(0)?;
                            Ok::<_, HttpError>(rest)
                        }),
                )
                .route(
                    RouteDef::post("")
                        .param(Param::body_field("name"))
                        .handle("upload", |_: Arc<FilesController>, args| async move {
                            let name: String = args.arg(0)?;
                            Ok::<_, HttpError>(json!({ "stored": name }))
                        }),
                ),
        )
    }
}

async fn router(limit: Option<usize>) -> axum::Router {
    let app = Application::create::<FilesModule>().await.unwrap();
    let mut transport = AxumTransport::new();
    if let Some(limit) = limit {
        transport = transport.body_limit(limit);
    }
    app.mount(&mut transport).unwrap();
    transport.into_router()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn get_route_returns_json() {
    let response = router(None)
        .await
        .oneshot(Request::get("/files/7?format=pdf").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-served-by"], "files");
    assert_eq!(json_body(response).await, json!({ "id": 7, "format": "pdf" }));
}

#[tokio::test]
async fn pipe_rejection_is_a_bad_request() {
    let response = router(None)
        .await
        .oneshot(Request::get("/files/seven").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["statusCode"], 400);
}

#[tokio::test]
async fn wildcard_binds_the_rest_of_the_path() {
    let response = router(None)
        .await
        .oneshot(Request::get("/files/raw/a/b.txt").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!("a/b.txt"));
}

#[tokio::test]
async fn unknown_path_uses_the_error_body() {
    let response = router(None)
        .await
        .oneshot(Request::get("/nothing").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Cannot GET /nothing");
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn post_body_is_parsed_and_limited() {
    let request = |name: String| {
        Request::post("/files")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "name": name }).to_string()))
            .unwrap()
    };

    let created = router(Some(256)).await.oneshot(request("a.txt".into())).await.unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    assert_eq!(json_body(created).await, json!({ "stored": "a.txt" }));

    let too_large = router(Some(256)).await.oneshot(request("x".repeat(1024))).await.unwrap();
    assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let response = router(None)
        .await
        .oneshot(
            Request::post("/files")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
