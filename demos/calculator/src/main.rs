use std::sync::Arc;
use std::time::Duration;

use objrpc::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Exposed types
// ---------------------------------------------------------------------------

struct Adder;

struct Calculator {
    memory: f64,
}

struct ScientificCalculator {
    base: Calculator,
    precision: u32,
}

struct Constants;

fn adder() -> Arc<ClassSchema> {
    ClassBuilder::<Adder>::new("Adder")
        .constructor(|_| Ok(Adder))
        .method("add", 2, |_, args| Ok(args.f64(0)? + args.f64(1)?))
        .build()
}

fn calculator() -> Arc<ClassSchema> {
    ClassBuilder::<Calculator>::new("Calculator")
        .constructor(|args| {
            Ok(Calculator {
                memory: args.f64_or(0, 0.0)?,
            })
        })
        .writable_property(
            "memory",
            |this| this.memory,
            |this, value| {
                this.memory = value.as_f64().ok_or("memory must be a number")?;
                Ok(())
            },
        )
        .method("add", 1, |this, args| {
            this.memory += args.f64(0)?;
            Ok(this.memory)
        })
        .method("subtract", 1, |this, args| {
            this.memory -= args.f64(0)?;
            Ok(this.memory)
        })
        .method("multiply", 1, |this, args| {
            this.memory *= args.f64(0)?;
            Ok(this.memory)
        })
        .method("divide", 1, |this, args| {
            let divisor = args.f64(0)?;
            if divisor == 0.0 {
                return Err("division by zero".to_string());
            }
            this.memory /= divisor;
            Ok(this.memory)
        })
        .method("clear", 0, |this, _| {
            this.memory = 0.0;
            Ok(Value::Null)
        })
        .build()
}

fn scientific_calculator() -> Arc<ClassSchema> {
    ClassBuilder::<ScientificCalculator>::new("ScientificCalculator")
        .constructor(|args| {
            Ok(ScientificCalculator {
                base: Calculator {
                    memory: args.f64_or(0, 0.0)?,
                },
                precision: 6,
            })
        })
        .writable_property(
            "precision",
            |this| this.precision,
            |this, value| {
                let precision = value
                    .as_i64()
                    .and_then(|p| u32::try_from(p).ok())
                    .filter(|p| *p <= 15)
                    .ok_or("precision must be an integer between 0 and 15")?;
                this.precision = precision;
                Ok(())
            },
        )
        .method("power", 1, |this, args| {
            this.base.memory = this.base.memory.powf(args.f64(0)?);
            Ok(round(this.base.memory, this.precision))
        })
        .method("sqrt", 0, |this, _| {
            if this.base.memory < 0.0 {
                return Err("square root of a negative number".to_string());
            }
            this.base.memory = this.base.memory.sqrt();
            Ok(round(this.base.memory, this.precision))
        })
        // Answers after a delay, to show deferred responses.
        .deferred("slowSquare", 2, |this, args| {
            let value = args.f64_or(0, this.base.memory);
            let delay = args.i64_or(1, 100);
            async move {
                let value = value?;
                let delay = u64::try_from(delay?).map_err(|_| "delay must not be negative")?;
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok::<Value, String>(Value::from(value * value))
            }
        })
        .extends(&calculator(), |this| &mut this.base)
        .build()
}

fn constants() -> Arc<ClassSchema> {
    ClassBuilder::<Constants>::new("Constants")
        .property("pi", |_| std::f64::consts::PI)
        .property("e", |_| std::f64::consts::E)
        .hidden_property("answer", |_| 42)
        .build()
}

fn round(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

fn builder(addr: &str) -> objrpc::RpcServerBuilder {
    RpcServer::builder()
        .bind(addr)
        .register(adder())
        .register(calculator())
        .register(scientific_calculator())
        .register_object("constants", constants(), Constants)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());
    let server = builder(&addr).build().await?;
    tracing::info!(addr = %server.local_addr()?, "calculator server starting");

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, shutting down");
            let _ = handle.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn start() -> RpcClient {
        let server = builder("127.0.0.1:0").build().await.expect("server should build");
        let url = format!("ws://{}", server.local_addr().unwrap());
        tokio::spawn(server.run());
        tokio::time::sleep(Duration::from_millis(10)).await;
        RpcClient::connect(&url).await.expect("connect")
    }

    #[test]
    fn test_round() {
        assert_eq!(round(1.23456789, 2), 1.23);
        assert_eq!(round(2.0, 0), 2.0);
    }

    #[tokio::test]
    async fn test_calculator_memory() {
        let client = start().await;
        let calc = client.new_object("Calculator", vec![json!(10)]).await.unwrap();

        assert_eq!(client.call_method(calc, "add", vec![json!(5)]).await.unwrap(), json!(15));
        assert_eq!(client.call_method(calc, "divide", vec![json!(3)]).await.unwrap(), json!(5));
        assert_eq!(
            client.call_method(calc, "divide", vec![json!(0)]).await.unwrap_err(),
            CallError::Remote("division by zero".into())
        );
        assert_eq!(client.get(calc, "memory").await.unwrap(), json!(5));

        let err = client.new_object("Calculator", vec![json!("ten")]).await.unwrap_err();
        assert_eq!(err, CallError::Remote("argument 0 must be a number, got string".into()));
    }

    #[tokio::test]
    async fn test_scientific_calculator_inherits() {
        let client = start().await;
        let sci = client.new_object("ScientificCalculator", vec![json!(2)]).await.unwrap();

        assert_eq!(client.call_method(sci, "power", vec![json!(10)]).await.unwrap(), json!(1024));
        assert_eq!(client.call_method(sci, "subtract", vec![json!(1000)]).await.unwrap(), json!(24));
        assert_eq!(
            client.call_method(sci, "slowSquare", vec![json!(3), json!(5)]).await.unwrap(),
            json!(9)
        );
        assert_eq!(
            client.call_method(sci, "slowSquare", vec![json!("three")]).await.unwrap_err(),
            CallError::Remote("argument 0 must be a number, got string".into())
        );
        assert_eq!(
            client.call_method(sci, "slowSquare", vec![json!(2), json!(-5)]).await.unwrap_err(),
            CallError::Remote("delay must not be negative".into())
        );

        let keys = client.call("keys", params(json!({"id": sci, "enumerable": false}))).await.unwrap();
        assert_eq!(
            keys,
            json!([
                "precision", "power", "sqrt", "slowSquare", "memory", "add", "subtract",
                "multiply", "divide", "clear"
            ])
        );
    }

    #[tokio::test]
    async fn test_constants_singleton() {
        let client = start().await;
        let objects = client.objects().await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].name, "constants");

        let pi = client.get(objects[0].id, "pi").await.unwrap();
        assert_eq!(pi.as_f64(), Some(std::f64::consts::PI));
        let keys = client.call("keys", params(json!({"id": objects[0].id}))).await.unwrap();
        assert_eq!(keys, json!(["pi", "e"]));
    }

    fn params(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        match value {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        }
    }
}
