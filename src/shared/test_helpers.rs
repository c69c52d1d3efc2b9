use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::core::error::Result;
use crate::modules::transport::{HttpRequest, HttpResponse, Transport};

pub const TEST_BASE_URL: &str = "https://demo.supabase.co";

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync;

/// In-memory [`Transport`] answering every request through a closure and
/// recording what was sent
pub struct ScriptedTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn base_url(&self) -> &str {
        TEST_BASE_URL
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        response
    }
}
