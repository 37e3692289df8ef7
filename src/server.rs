use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::host_api::{HostApi, ResponseFuture, SendOptions};
use crate::ipc::agent::{
    ApiBodyParams, ApiDeleteParams, ApiDeleteRequest, ApiGetParams, ApiGetRequest,
    ApiPostRequest, ApiPutRequest,
};

/// REST calls proxied through the agent.
#[derive(Clone)]
pub struct Server {
    api: HostApi,
}

impl Server {
    pub fn new(api: HostApi) -> Self {
        Server { api }
    }

    pub fn get<R>(&self, url: &str, param_data: Option<Value>) -> ResponseFuture<R>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let params = ApiGetParams {
            url: url.to_string(),
            param_data,
        };
        self.api
            .send::<ApiGetRequest<R>>(&params, SendOptions::default())
    }

    pub fn post<R>(&self, url: &str, body: Option<Value>) -> ResponseFuture<R>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let params = ApiBodyParams {
            url: url.to_string(),
            body,
        };
        self.api
            .send::<ApiPostRequest<R>>(&params, SendOptions::default())
    }

    pub fn put<R>(&self, url: &str, body: Option<Value>) -> ResponseFuture<R>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let params = ApiBodyParams {
            url: url.to_string(),
            body,
        };
        self.api
            .send::<ApiPutRequest<R>>(&params, SendOptions::default())
    }

    pub fn delete<R>(&self, url: &str) -> ResponseFuture<R>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let params = ApiDeleteParams {
            url: url.to_string(),
        };
        self.api
            .send::<ApiDeleteRequest<R>>(&params, SendOptions::default())
    }
}
