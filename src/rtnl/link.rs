use futures::TryStreamExt;

use netlink_packet_route::link::LinkAttribute;
use netlink_packet_route::link::LinkMessage;

use crate::interface::Interface;
use crate::interface::InterfaceId;
use crate::interface::LinkAddr;
use crate::ndisc::link::DeviceFlags;
use crate::ndisc::link::LinkInfo;
use crate::ndisc::link::LinkType;

/// Used when a link reports no MTU.
const FALLBACK_MTU: u32 = 1500;

pub struct LinkManager {
    handle: rtnetlink::LinkHandle,
}

/// Name, hardware addresses and MTU from a link dump. Link type and
/// device flags are filled in by the caller.
fn interface_from_message(msg: &LinkMessage) -> Option<Interface> {
    let if_index = msg.header.index;
    if if_index == 0 {
        return None;
    }

    let mut if_name = None;
    let mut addr = None;
    let mut broadcast = None;
    let mut mtu = FALLBACK_MTU;
    for attr in msg.attributes.iter() {
        match attr {
            LinkAttribute::IfName(name) => if_name = Some(name.clone()),
            // all-zero addresses come from links without one (tunnels, lo)
            LinkAttribute::Address(bytes) if bytes.iter().any(|b| *b != 0) => addr = LinkAddr::from_slice(bytes),
            LinkAttribute::Broadcast(bytes) => broadcast = LinkAddr::from_slice(bytes),
            LinkAttribute::Mtu(value) => mtu = *value,
            _ => {}
        }
    }

    let link = LinkInfo {
        link_type: if addr.is_some() { LinkType::Ethernet } else { LinkType::Headerless },
        flags: DeviceFlags::default(),
        addr,
        broadcast,
        mtu,
    };

    Some(Interface { if_id: InterfaceId::new(if_index), if_name: if_name?, link })
}

impl LinkManager {
    pub(crate) fn new(handle: &super::RtnetlinkConnection) -> Self {
        Self { handle: handle.handle.link() }
    }

    pub async fn get_all(&mut self) -> Result<Vec<Interface>, std::io::Error> {
        let mut interfaces = Vec::new();
        let response = self.handle.get().execute();
        futures::pin_mut!(response);
        while let Some(response) = response.try_next().await.map_err(std::io::Error::other)? {
            if let Some(interface) = interface_from_message(&response) {
                interfaces.push(interface);
            }
        }
        Ok(interfaces)
    }

    pub async fn get(&mut self, if_id: InterfaceId) -> Result<Option<Interface>, std::io::Error> {
        let response = self.handle.get().match_index(if_id.inner_unchecked()).execute();
        futures::pin_mut!(response);
        while let Some(response) = response.try_next().await.map_err(std::io::Error::other)? {
            if let Some(interface) = interface_from_message(&response) {
                return Ok(Some(interface));
            }
        }
        Ok(None)
    }

    pub async fn get_by_name(&mut self, if_name: &str) -> Result<Option<Interface>, std::io::Error> {
        let response = self.handle.get().match_name(if_name.to_owned()).execute();
        futures::pin_mut!(response);
        while let Some(response) = response.try_next().await.map_err(std::io::Error::other)? {
            if let Some(interface) = interface_from_message(&response) {
                return Ok(Some(interface));
            }
        }
        Ok(None)
    }
}
