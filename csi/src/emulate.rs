//! Emulated driver table.
//!
//! The plugin can stand in for another CSI driver: the emulated driver's
//! name selects how incoming volume attributes translate into the
//! controller's typed map-volume parameters, and which capabilities the
//! plugin advertises. The table is fixed at start-up; there is no runtime
//! mutation.

use std::collections::HashMap;

use lazy_static::lazy_static;
use rpc::{
    csi::{
        controller_service_capability::rpc::Type as ControllerCap,
        volume_capability::access_mode::Mode,
    },
    v0::{map_volume_request::Params, CephParams, MallocParams},
};

use crate::backend::{BackendError, DeviceRequest};

/// The native driver name, backing volumes with malloc bdevs.
pub const DEFAULT_DRIVER: &str = "malloc";

pub struct EmulatedDriver {
    pub name: &'static str,
    pub service_caps: &'static [ControllerCap],
    pub access_modes: &'static [Mode],
    pub map_volume_params:
        fn(&DeviceRequest) -> Result<Params, BackendError>,
}

lazy_static! {
    static ref DRIVERS: HashMap<&'static str, EmulatedDriver> = {
        let mut table = HashMap::new();
        table.insert(
            DEFAULT_DRIVER,
            EmulatedDriver {
                name: DEFAULT_DRIVER,
                service_caps: &[ControllerCap::CreateDeleteVolume],
                access_modes: &[
                    Mode::SingleNodeWriter,
                    Mode::SingleNodeReaderOnly,
                    Mode::MultiNodeReaderOnly,
                ],
                map_volume_params: malloc_params,
            },
        );
        table.insert(
            "ceph-rbd",
            EmulatedDriver {
                name: "ceph-rbd",
                service_caps: &[ControllerCap::CreateDeleteVolume],
                access_modes: &[
                    Mode::SingleNodeWriter,
                    Mode::SingleNodeReaderOnly,
                ],
                map_volume_params: ceph_params,
            },
        );
        table
    };
}

pub fn lookup(name: &str) -> Option<&'static EmulatedDriver> {
    DRIVERS.get(name)
}

fn malloc_params(_request: &DeviceRequest) -> Result<Params, BackendError> {
    Ok(Params::Malloc(MallocParams {}))
}

/// Translate the attributes the Ceph RBD driver would have received. The
/// image name is the trailing segment of the staging path, the way that
/// driver names its per-volume directories.
fn ceph_params(request: &DeviceRequest) -> Result<Params, BackendError> {
    let missing = |what: &str| {
        BackendError::InvalidArgument(format!(
            "ceph-rbd: missing {} for volume {}",
            what, request.volume_id
        ))
    };

    let pool = request
        .parameters
        .get("pool")
        .ok_or_else(|| missing("pool parameter"))?
        .clone();
    let monitors = match request.parameters.get("monitors") {
        Some(monitors) => monitors.clone(),
        None => {
            let key = request
                .parameters
                .get("monValueFromSecret")
                .ok_or_else(|| missing("monitors"))?;
            request
                .secrets
                .get(key)
                .ok_or_else(|| missing("monitor secret"))?
                .clone()
        }
    };
    let user_id = request
        .parameters
        .get("adminId")
        .or_else(|| request.parameters.get("userId"))
        .cloned()
        .unwrap_or_else(|| "admin".to_string());
    let secret = request
        .secrets
        .get(&user_id)
        .ok_or_else(|| missing("user key"))?
        .clone();
    let image = request
        .staging_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string();
    if image.is_empty() {
        return Err(missing("image name (empty staging path)"));
    }

    Ok(Params::Ceph(CephParams {
        user_id,
        secret,
        monitors: monitors.split(',').map(str::to_string).collect(),
        pool,
        image,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ceph_request() -> DeviceRequest {
        DeviceRequest {
            volume_id: "vol-1".to_string(),
            staging_path: "/var/lib/kubelet/staging/image-7".to_string(),
            parameters: [
                ("pool".to_string(), "rbd".to_string()),
                ("monitors".to_string(), "1.2.3.4:6789,5.6.7.8:6789".to_string()),
                ("adminId".to_string(), "admin".to_string()),
            ]
            .into(),
            secrets: [("admin".to_string(), "s3cr3t".to_string())].into(),
            volume_context: Default::default(),
        }
    }

    #[test]
    fn default_driver_maps_to_malloc() {
        let driver = lookup(DEFAULT_DRIVER).unwrap();
        let params =
            (driver.map_volume_params)(&DeviceRequest::default()).unwrap();
        assert!(matches!(params, Params::Malloc(_)));
    }

    #[test]
    fn ceph_extracts_attributes() {
        let driver = lookup("ceph-rbd").unwrap();
        let params = (driver.map_volume_params)(&ceph_request()).unwrap();
        match params {
            Params::Ceph(ceph) => {
                assert_eq!(ceph.pool, "rbd");
                assert_eq!(
                    ceph.monitors,
                    vec!["1.2.3.4:6789", "5.6.7.8:6789"]
                );
                assert_eq!(ceph.user_id, "admin");
                assert_eq!(ceph.secret, "s3cr3t");
                assert_eq!(ceph.image, "image-7");
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn ceph_monitors_can_come_from_a_secret() {
        let mut request = ceph_request();
        request.parameters.remove("monitors");
        request
            .parameters
            .insert("monValueFromSecret".to_string(), "mons".to_string());
        request
            .secrets
            .insert("mons".to_string(), "9.9.9.9:6789".to_string());

        let driver = lookup("ceph-rbd").unwrap();
        match (driver.map_volume_params)(&request).unwrap() {
            Params::Ceph(ceph) => {
                assert_eq!(ceph.monitors, vec!["9.9.9.9:6789"])
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn ceph_requires_pool() {
        let mut request = ceph_request();
        request.parameters.remove("pool");
        let driver = lookup("ceph-rbd").unwrap();
        assert!(matches!(
            (driver.map_volume_params)(&request),
            Err(BackendError::InvalidArgument(_))
        ));
    }
}
