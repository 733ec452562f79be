use crate::service::preflight_response;
use crate::service::CounterService;
use crate::store::CounterStore;
use anyhow::anyhow;
use dropshot::endpoint;
use dropshot::ApiDescription;
use dropshot::ConfigDropshot;
use dropshot::HttpError;
use dropshot::HttpServerStarter;
use dropshot::RequestContext;
use http::Response;
use hyper::Body;
use std::sync::Arc;

/// The server-wide context is the counter service, which in turn holds the
/// shared store handle
pub struct CounterContext {
    service: CounterService,
}

impl CounterContext {
    fn new(store: Arc<dyn CounterStore>) -> CounterContext {
        CounterContext { service: CounterService::new(store) }
    }
}

pub fn counter_api() -> anyhow::Result<ApiDescription<CounterContext>> {
    let mut api = ApiDescription::new();
    api.register(api_get_count).map_err(|error| anyhow!(error))?;
    api.register(api_post_count).map_err(|error| anyhow!(error))?;
    api.register(api_options_count).map_err(|error| anyhow!(error))?;
    Ok(api)
}

pub async fn create_dropshot_server(
    config_dropshot: ConfigDropshot,
    log: slog::Logger,
    store: Arc<dyn CounterStore>,
) -> anyhow::Result<dropshot::HttpServer<CounterContext>> {
    let api = counter_api()?;
    let api_context = CounterContext::new(store);

    Ok(HttpServerStarter::new(&config_dropshot, api, api_context, &log)
        .map_err(|error| anyhow!("creating Dropshot server: {:#}", error))?
        .start())
}

/// Count a visit and return the new total.
#[endpoint {
    method = GET,
    path = "/count",
}]
async fn api_get_count(
    rqctx: RequestContext<CounterContext>,
) -> Result<Response<Body>, HttpError> {
    let api_context = rqctx.context();
    api_context.service.handle(&rqctx.log).await.into_response()
}

/// Count a visit and return the new total.  The request body is ignored.
#[endpoint {
    method = POST,
    path = "/count",
}]
async fn api_post_count(
    rqctx: RequestContext<CounterContext>,
) -> Result<Response<Body>, HttpError> {
    let api_context = rqctx.context();
    api_context.service.handle(&rqctx.log).await.into_response()
}

/// CORS preflight.  Does not count as a visit.
#[endpoint {
    method = OPTIONS,
    path = "/count",
}]
async fn api_options_count(
    _rqctx: RequestContext<CounterContext>,
) -> Result<Response<Body>, HttpError> {
    preflight_response()
}
