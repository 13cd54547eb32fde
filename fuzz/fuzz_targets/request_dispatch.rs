#![no_main]

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use ferrous_nest::controller::{ControllerDef, Param, RouteDef};
use ferrous_nest::http::{HttpError, HttpMethod, HttpRequest};
use ferrous_nest::pipeline::{ParseIntPipe, Rule, ValidationPipe};
use ferrous_nest::transport::InMemoryTransport;
use ferrous_nest::{Application, DiResult, Injectable, Injected, Module, ModuleDef};
use libfuzzer_sys::fuzz_target;
use tokio::runtime::Runtime;

struct EchoController;

#[async_trait]
impl Injectable for EchoController {
    async fn construct(_: Injected) -> DiResult<Self> {
        Ok(EchoController)
    }
}

struct FuzzModule;

impl Module for FuzzModule {
    fn define() -> ModuleDef {
        ModuleDef::new::<Self>().controller(
            ControllerDef::new::<EchoController>("echo")
                .route(
                    RouteDef::get(":id/*")
                        .param(Param::path("id").pipe(ParseIntPipe::default()))
                        .param(Param::query("q"))
                        .handle("get", |_: Arc<EchoController>, args| async move {
                            Ok::<_, HttpError>(args.value(0).cloned().unwrap_or_default())
                        }),
                )
                .route(
                    RouteDef::post("")
                        .param(Param::body().pipe(
                            ValidationPipe::new()
                                .field("name", [Rule::Required, Rule::String, Rule::MaxLength(16)])
                                .whitelist(),
                        ))
                        .handle("post", |_: Arc<EchoController>, args| async move {
                            Ok::<_, HttpError>(args.value(0).cloned().unwrap_or_default())
                        }),
                ),
        )
    }
}

fn harness() -> &'static (Runtime, InMemoryTransport) {
    static HARNESS: OnceLock<(Runtime, InMemoryTransport)> = OnceLock::new();
    HARNESS.get_or_init(|| {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let app = rt.block_on(Application::create::<FuzzModule>()).unwrap();
        let transport = app.in_memory().unwrap();
        (rt, transport)
    })
}

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let (rt, transport) = harness();

    let (target, body) = input.split_once('\n').unwrap_or((input, ""));
    let request = match serde_json::from_str(body) {
        Ok(body) => HttpRequest::new(HttpMethod::Post, "/echo").with_body(body),
        Err(_) => HttpRequest::new(HttpMethod::Get, target),
    };

    let response = rt.block_on(transport.handle(request));
    assert!((200..600).contains(&response.status));
    if response.status >= 500 {
        panic!("unexpected server error: {}", response.body);
    }
});
