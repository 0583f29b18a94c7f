use std::io::{self, Write};

use serde_json::Value;

use super::config::{OutputConfig, OutputFormat};
use super::types::Envelope;

pub trait Presenter: Send + Sync {
    fn emit(&self, env: &Envelope, w: &mut dyn Write) -> io::Result<()>;
}

pub struct JsonPresenter { pub pretty: bool }
impl Presenter for JsonPresenter {
    fn emit(&self, env: &Envelope, w: &mut dyn Write) -> io::Result<()> {
        if self.pretty { serde_json::to_writer_pretty(&mut *w, env).map_err(to_io)? } else { serde_json::to_writer(&mut *w, env).map_err(to_io)? }
        writeln!(w)
    }
}

/// Human output: one block per post (title, `- <url>` lines, then fields or the
/// failure), followed by totals. `pretty` appends the raw payload.
pub struct TextPresenter { pub pretty: bool }
impl Presenter for TextPresenter {
    fn emit(&self, env: &Envelope, w: &mut dyn Write) -> io::Result<()> {
        let (label, payload) = if env.apply { ("Result", &env.result) } else { ("Plan", &env.plan) };
        writeln!(w, "{}: {}", label, env.op)?;
        let Some(payload) = payload else { return Ok(()) };

        match env.op {
            "scan" => render_scan(payload, w)?,
            "extract" => render_extract(payload, w)?,
            _ => {}
        }
        if self.pretty {
            serde_json::to_writer_pretty(&mut *w, payload).map_err(to_io)?;
            writeln!(w)?;
        }
        Ok(())
    }
}

fn render_scan(payload: &Value, w: &mut dyn Write) -> io::Result<()> {
    for post in payload.get("posts").and_then(Value::as_array).into_iter().flatten() {
        writeln!(w, "{}", str_of(post, "title"))?;
        for url in strings(post, "images") { writeln!(w, "- {}", url)?; }
        for id in strings(post, "missing_media") { writeln!(w, "- (no metadata for {})", id)?; }

        match str_of(post, "status") {
            "skipped" => writeln!(w, "  skipped: not a gallery")?,
            "planned" => writeln!(w, "  request built, not sent")?,
            "failed" => {
                let err = post.get("error").unwrap_or(&Value::Null);
                writeln!(w, "  failed ({}): {}", str_of(err, "kind"), str_of(err, "message"))?;
            }
            _ => writeln!(w, "  {}", strings(post, "fields").join(" | "))?,
        }
    }

    if let Some(t) = payload.get("totals") {
        let n = |k: &str| t.get(k).and_then(Value::as_u64).unwrap_or(0);
        writeln!(
            w,
            "posts={} extracted={} skipped={} planned={} failed={}",
            n("posts"), n("extracted"), n("skipped"), n("planned"), n("failed")
        )?;
    }
    Ok(())
}

fn render_extract(payload: &Value, w: &mut dyn Write) -> io::Result<()> {
    for url in strings(payload, "images") { writeln!(w, "- {}", url)?; }
    writeln!(w, "  {}", strings(payload, "fields").join(" | "))
}

fn str_of<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(Value::as_str).unwrap_or("")
}

fn strings<'a>(v: &'a Value, key: &str) -> Vec<&'a str> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|xs| xs.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

pub struct Emitter {
    presenter: Box<dyn Presenter>,
}

impl Emitter {
    pub fn from_env(cfg: OutputConfig) -> Self {
        let presenter: Box<dyn Presenter> = match cfg.format {
            OutputFormat::Json => Box::new(JsonPresenter { pretty: cfg.pretty }),
            OutputFormat::Text => Box::new(TextPresenter { pretty: cfg.pretty }),
        };
        Emitter { presenter }
    }

    pub fn emit(&self, env: &Envelope) -> io::Result<()> {
        let mut out = io::stdout();
        self.presenter.emit(env, &mut out)?;
        out.flush()
    }
}

fn to_io(e: serde_json::Error) -> io::Error { io::Error::new(io::ErrorKind::Other, e) }
