//! Services exposed by `wirerpc serve`.

use std::time::Duration;

use serde_json::{json, Value};
use wirerpc_connection::{
    ErrorEnvelope, RegisterOptions, RequestContext, RpcServiceMap, Service, ServiceRegistry,
};
use wirerpc_fury::{FieldDesc, ProtocolMethod, TypeDesc};

/// Typed methods, callable over Fury once the caller loads [`protocols`].
pub fn rpc_services() -> RpcServiceMap {
    RpcServiceMap::new()
        .with(
            ProtocolMethod::new(
                "shortUrl",
                vec![FieldDesc::new("url", TypeDesc::String)],
                TypeDesc::String,
            ),
            |args: Vec<Value>, _ctx: RequestContext| async move {
                let url = string_arg(&args, 0)?;
                Ok(json!(url.chars().take(10).collect::<String>()))
            },
        )
        .with(
            ProtocolMethod::new(
                "add",
                vec![
                    FieldDesc::new("a", TypeDesc::Int64),
                    FieldDesc::new("b", TypeDesc::Int64),
                ],
                TypeDesc::Int64,
            ),
            |args: Vec<Value>, _ctx: RequestContext| async move {
                let a = int_arg(&args, 0)?;
                let b = int_arg(&args, 1)?;
                a.checked_add(b)
                    .map(|sum| json!(sum))
                    .ok_or_else(|| ErrorEnvelope::new("RangeError", "sum overflows int64"))
            },
        )
        .with(
            ProtocolMethod::new(
                "sleep",
                vec![FieldDesc::new("ms", TypeDesc::Int64)],
                TypeDesc::Int64,
            ),
            |args: Vec<Value>, ctx: RequestContext| async move {
                let ms = int_arg(&args, 0)?.max(0) as u64;
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(json!(ms)),
                    _ = ctx.canceled() => Err(ErrorEnvelope::new("CanceledError", "sleep canceled")),
                }
            },
        )
}

pub fn protocols() -> Vec<ProtocolMethod> {
    rpc_services().protocols().cloned().collect()
}

/// Untyped functions served through the registry fallback (JSON only).
pub fn registry() -> ServiceRegistry {
    let registry = ServiceRegistry::new();
    registry.register("echo", |args: Vec<Value>| Ok(Value::Array(args)));
    registry.register("sum", |args: Vec<Value>| {
        Ok(json!(args.iter().filter_map(Value::as_f64).sum::<f64>()))
    });
    registry.register("fail", |args: Vec<Value>| {
        let message = args.first().and_then(Value::as_str).unwrap_or("failed on request");
        Err(ErrorEnvelope::new("CustomError", message).with_extra("code", 42))
    });
    registry.register_service(
        std::sync::Arc::new(TextService),
        RegisterOptions::default().with_name_converter(|name| format!("text.{name}")),
    );
    registry
}

struct TextService;

impl Service for TextService {
    fn methods(&self) -> Vec<&'static str> {
        vec!["upper", "lower", "reverse"]
    }

    fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, ErrorEnvelope> {
        let text = string_arg(&args, 0)?;
        let out = match method {
            "upper" => text.to_uppercase(),
            "lower" => text.to_lowercase(),
            "reverse" => text.chars().rev().collect(),
            other => return Err(ErrorEnvelope::method_not_found(other)),
        };
        Ok(Value::String(out))
    }
}

fn string_arg(args: &[Value], index: usize) -> Result<&str, ErrorEnvelope> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| ErrorEnvelope::new("TypeError", format!("argument {index} must be a string")))
}

fn int_arg(args: &[Value], index: usize) -> Result<i64, ErrorEnvelope> {
    args.get(index)
        .and_then(Value::as_i64)
        .ok_or_else(|| ErrorEnvelope::new("TypeError", format!("argument {index} must be an integer")))
}
