//! The registry's own grpc service on top of [`Store`].

use rpc::v0::{
    registry_server::Registry, GetValuesReply, GetValuesRequest, SetValueReply,
    SetValueRequest, Value,
};
use tonic::{Request, Response, Status};
use tracing::debug;

use crate::store::Store;

#[derive(Debug, Clone)]
pub struct RegistryService {
    store: Store,
}

impl RegistryService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[tonic::async_trait]
impl Registry for RegistryService {
    async fn set_value(
        &self,
        request: Request<SetValueRequest>,
    ) -> Result<Response<SetValueReply>, Status> {
        let value = request
            .into_inner()
            .value
            .ok_or_else(|| Status::invalid_argument("Missing value"))?;
        debug!(path = %value.path, "SetValue");
        self.store
            .set(&value.path, &value.value)
            .map_err(|err| Status::invalid_argument(err.to_string()))?;
        Ok(Response::new(SetValueReply {}))
    }

    async fn get_values(
        &self,
        request: Request<GetValuesRequest>,
    ) -> Result<Response<GetValuesReply>, Status> {
        let prefix = request.into_inner().path;
        let values = self
            .store
            .get_values(&prefix)
            .map_err(|err| Status::invalid_argument(err.to_string()))?;
        Ok(Response::new(GetValuesReply {
            values: values
                .into_iter()
                .map(|(path, value)| Value { path, value })
                .collect(),
        }))
    }
}
