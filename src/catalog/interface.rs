//! Interface-type tokens and their VPP graph input nodes.
//!
//! `phy` / `physical` is the only token that is not a fixed mapping: it is
//! replaced by the uplink driver configured for the cluster, resolved at
//! most once.

use crate::cluster::Inventory;
use crate::error::RelayError;

pub const TOKEN_HELP: &str = "Supported interface types:
  phy       : use the physical interface driver configured in calico-vpp-config
  af_xdp    : use an AF_XDP socket to drive the interface
  af_packet : use an AF_PACKET socket to drive the interface
  avf       : use the VPP native driver for Intel 700-Series and 800-Series interfaces
  vmxnet3   : use the VPP native driver for VMware virtual interfaces
  virtio    : use the VPP native driver for Virtio virtual interfaces
  tuntap    : alias for virtio (default)
  rdma      : use the VPP native driver for Mellanox CX-4 and CX-5 interfaces
  dpdk      : use the DPDK interface drivers with VPP
  memif     : use shared memory interfaces (memif)
  vcl       : capture packets at the session layer

Default: virtio (if no interface type is specified)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceType {
    Physical,
    AfXdp,
    AfPacket,
    Avf,
    Vmxnet3,
    Virtio,
    Rdma,
    Dpdk,
    Memif,
    Vcl,
}

impl InterfaceType {
    /// Parse a caller token. Empty selects the virtio default.
    pub fn parse(token: &str) -> Result<Self, RelayError> {
        let ty = match token.trim() {
            "phy" | "physical" => InterfaceType::Physical,
            "af_xdp" => InterfaceType::AfXdp,
            "af_packet" => InterfaceType::AfPacket,
            "avf" => InterfaceType::Avf,
            "vmxnet3" => InterfaceType::Vmxnet3,
            "virtio" | "tuntap" | "" => InterfaceType::Virtio,
            "rdma" => InterfaceType::Rdma,
            "dpdk" => InterfaceType::Dpdk,
            "memif" => InterfaceType::Memif,
            "vcl" => InterfaceType::Vcl,
            other => {
                return Err(RelayError::InterfaceTokenInvalid {
                    token: other.to_string(),
                });
            }
        };
        Ok(ty)
    }

    /// Graph input node for concrete drivers; `None` for `Physical`.
    pub fn input_node(self) -> Option<&'static str> {
        let node = match self {
            InterfaceType::Physical => return None,
            InterfaceType::AfXdp => "af-xdp-input",
            InterfaceType::AfPacket => "af-packet-input",
            InterfaceType::Avf => "avf-input",
            InterfaceType::Vmxnet3 => "vmxnet3-input",
            InterfaceType::Virtio => "virtio-input",
            InterfaceType::Rdma => "rdma-input",
            InterfaceType::Dpdk => "dpdk-input",
            InterfaceType::Memif => "memif-input",
            InterfaceType::Vcl => "session-queue",
        };
        Some(node)
    }

    pub fn label(self) -> &'static str {
        match self {
            InterfaceType::Physical => "phy",
            InterfaceType::AfXdp => "af_xdp",
            InterfaceType::AfPacket => "af_packet",
            InterfaceType::Avf => "avf",
            InterfaceType::Vmxnet3 => "vmxnet3",
            InterfaceType::Virtio => "virtio",
            InterfaceType::Rdma => "rdma",
            InterfaceType::Dpdk => "dpdk",
            InterfaceType::Memif => "memif",
            InterfaceType::Vcl => "vcl",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputNode {
    pub node: &'static str,
    pub driver: InterfaceType,
}

/// Map a token to its input node, consulting the cluster config for `phy`.
///
/// The configured driver name is untrusted: it is looked up once and must
/// name a concrete driver, so a config pointing back at `phy` is an error
/// rather than a loop.
pub async fn resolve_input_node(
    token: &str,
    inventory: &dyn Inventory,
) -> Result<InputNode, RelayError> {
    let requested = InterfaceType::parse(token)?;
    if let Some(node) = requested.input_node() {
        return Ok(InputNode {
            node,
            driver: requested,
        });
    }

    let driver = inventory.uplink_driver().await?;
    let resolved = InterfaceType::parse(&driver)?;
    match resolved.input_node() {
        Some(node) => Ok(InputNode {
            node,
            driver: resolved,
        }),
        None => Err(RelayError::DriverCycle { driver }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::StaticInventory;

    #[test]
    fn fixed_tokens_map_deterministically() {
        let table = [
            ("af_xdp", "af-xdp-input"),
            ("af_packet", "af-packet-input"),
            ("avf", "avf-input"),
            ("vmxnet3", "vmxnet3-input"),
            ("virtio", "virtio-input"),
            ("tuntap", "virtio-input"),
            ("rdma", "rdma-input"),
            ("dpdk", "dpdk-input"),
            ("memif", "memif-input"),
            ("vcl", "session-queue"),
            ("", "virtio-input"),
        ];
        for (token, node) in table {
            for _ in 0..2 {
                let ty = InterfaceType::parse(token).unwrap();
                assert_eq!(ty.input_node(), Some(node), "token {token:?}");
            }
        }
    }

    #[test]
    fn unknown_tokens_share_the_same_help() {
        for token in ["eth0", "PHY", "xdp", "any"] {
            let err = InterfaceType::parse(token).unwrap_err();
            let text = err.to_string();
            assert_eq!(text, format!("Invalid interface type: {token}\n\n{TOKEN_HELP}"));
        }
    }

    #[test]
    fn physical_has_no_fixed_node() {
        assert_eq!(InterfaceType::parse("phy").unwrap(), InterfaceType::Physical);
        assert_eq!(InterfaceType::parse("physical").unwrap(), InterfaceType::Physical);
        assert_eq!(InterfaceType::Physical.input_node(), None);
    }

    #[tokio::test]
    async fn physical_resolves_like_its_driver() {
        let inventory = StaticInventory::new(&["node-1"]).with_driver("rdma");
        let via_phy = resolve_input_node("physical", &inventory).await.unwrap();
        let direct = resolve_input_node("rdma", &inventory).await.unwrap();
        assert_eq!(via_phy, direct);
        assert_eq!(via_phy.node, "rdma-input");
        assert_eq!(inventory.driver_lookups(), 1);
    }

    #[tokio::test]
    async fn concrete_token_skips_config_lookup() {
        let inventory = StaticInventory::new(&["node-1"]).with_driver("rdma");
        resolve_input_node("dpdk", &inventory).await.unwrap();
        assert_eq!(inventory.driver_lookups(), 0);
    }

    #[tokio::test]
    async fn physical_driver_pointing_back_is_rejected() {
        let inventory = StaticInventory::new(&["node-1"]).with_driver("phy");
        let err = resolve_input_node("phy", &inventory).await.unwrap_err();
        assert!(matches!(err, RelayError::DriverCycle { ref driver } if driver == "phy"));
        assert_eq!(inventory.driver_lookups(), 1);
    }

    #[tokio::test]
    async fn unknown_configured_driver_is_reported() {
        let inventory = StaticInventory::new(&["node-1"]).with_driver("mlx5");
        let err = resolve_input_node("phy", &inventory).await.unwrap_err();
        assert!(matches!(err, RelayError::InterfaceTokenInvalid { ref token } if token == "mlx5"));
    }
}
