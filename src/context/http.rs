use actix_web::HttpRequest;
use serde_json::Value;

use super::HttpContext;

impl HttpContext {
    /// Copies headers and matched path parameters out of an actix-web
    /// request.
    ///
    /// A header that is repeated, or whose value is not valid UTF-8, is
    /// recorded in `unreadable_headers` rather than in `headers`.
    pub fn from_request(req: &HttpRequest) -> Self {
        let mut ctx = HttpContext::new();
        for (name, value) in req.headers().iter() {
            let name = name.as_str().to_lowercase();
            if ctx.unreadable_headers.contains(&name) {
                continue;
            }
            if ctx.headers.remove(&name).is_some() {
                ctx.unreadable_headers.insert(name);
                continue;
            }
            match std::str::from_utf8(value.as_bytes()) {
                Ok(value) => {
                    ctx.headers.insert(name, value.to_string());
                }
                Err(_) => {
                    ctx.unreadable_headers.insert(name);
                }
            }
        }

        for (name, value) in req.match_info().iter() {
            ctx.params
                .insert(name.to_string(), Value::String(value.to_string()));
        }

        ctx
    }
}
