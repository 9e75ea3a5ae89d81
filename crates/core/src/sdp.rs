//! SDP (Session Description Protocol) generation (RFC 8866).
//!
//! No negotiation happens on the wire, so a receiver learns the stream
//! parameters from a file rendered here:
//!
//! ```text
//! v=0                                              ← protocol version
//! o=- <sess-id> 0 IN IP4 <addr>                    ← origin
//! s=<session-name>                                 ← session name
//! c=IN IP4 <addr>                                  ← destination address
//! t=0 0                                            ← timing (live stream)
//! a=tool:rtp-streamer                              ← sender software
//! a=sendonly                                       ← direction
//! m=video 5004 RTP/AVP 96                          ← destination port
//! a=rtpmap:96 H264/90000                           ← codec/clock rate
//! a=fmtp:96 packetization-mode=1;...               ← codec parameters
//! ```
//!
//! Open with `ffplay -protocol_whitelist file,udp,rtp left.sdp`.

use std::net::IpAddr;

use crate::media::h264::sdp_attributes;
use crate::media::params::ParameterSets;

/// Inputs for [`generate_sdp`].
#[derive(Debug, Clone, Copy)]
pub struct SdpParams<'a> {
    pub session_name: &'a str,
    /// Origin session id (`o=- <id> ...`).
    pub session_id: u64,
    /// Address the RTP packets are sent to.
    pub host: &'a str,
    pub port: u16,
    pub payload_type: u8,
    /// Adds `profile-level-id` and `sprop-parameter-sets` when known.
    pub parameter_sets: Option<&'a ParameterSets>,
}

/// Render a session description for one stream. Lines end in CRLF.
pub fn generate_sdp(params: &SdpParams<'_>) -> String {
    let addr_type = match params.host.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => "IP6",
        _ => "IP4",
    };

    let mut sdp: Vec<String> = Vec::new();

    sdp.push("v=0".to_string());
    sdp.push(format!(
        "o=- {} 0 IN {} {}",
        params.session_id, addr_type, params.host
    ));
    sdp.push(format!("s={}", params.session_name));
    sdp.push(format!("c=IN {} {}", addr_type, params.host));
    sdp.push("t=0 0".to_string());
    sdp.push("a=tool:rtp-streamer".to_string());
    sdp.push("a=sendonly".to_string());
    sdp.push(format!(
        "m=video {} RTP/AVP {}",
        params.port, params.payload_type
    ));
    sdp.extend(sdp_attributes(params.payload_type, params.parameter_sets));

    tracing::debug!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params<'a>(host: &'a str, sets: Option<&'a ParameterSets>) -> SdpParams<'a> {
        SdpParams {
            session_name: "Left Eye",
            session_id: 0x12345678,
            host,
            port: 5004,
            payload_type: 96,
            parameter_sets: sets,
        }
    }

    #[test]
    fn generates_h264_sdp() {
        let sdp = generate_sdp(&params("192.168.1.100", None));
        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("o=- 305419896 0 IN IP4 192.168.1.100\r\n"));
        assert!(sdp.contains("s=Left Eye\r\n"));
        assert!(sdp.contains("c=IN IP4 192.168.1.100\r\n"));
        assert!(sdp.contains("t=0 0\r\n"));
        assert!(
            sdp.contains("a=tool:rtp-streamer\r\n"),
            "SDP must include tool attribute"
        );
        assert!(
            sdp.contains("a=sendonly\r\n"),
            "SDP must include sendonly direction"
        );
        assert!(sdp.contains("m=video 5004 RTP/AVP 96\r\n"));
        assert!(sdp.contains("a=rtpmap:96 H264/90000\r\n"));
        assert!(sdp.contains("a=fmtp:96 packetization-mode=1\r\n"));

        // rtpmap must come before fmtp (RFC 6184 §8.2.1)
        let rtpmap_idx = sdp.find("a=rtpmap").expect("SDP must include rtpmap");
        let fmtp_idx = sdp.find("a=fmtp").expect("SDP must include fmtp");
        assert!(rtpmap_idx < fmtp_idx);

        let sendonly_idx = sdp.find("a=sendonly").expect("SDP must include sendonly");
        let m_idx = sdp.find("m=video").expect("SDP must include media section");
        assert!(
            sendonly_idx < m_idx,
            "session-level attrs must precede m= line"
        );
        assert!(fmtp_idx > m_idx, "media attributes must follow m=video");
        assert!(sdp.ends_with("\r\n"), "SDP must end with CRLF");
    }

    #[test]
    fn includes_parameter_sets_when_known() {
        let sets = ParameterSets::new(
            vec![0x67, 0x42, 0x00, 0x1E, 0x95],
            vec![0x68, 0xCE, 0x38, 0x80],
        );
        let sdp = generate_sdp(&params("10.0.0.2", Some(&sets)));
        assert!(sdp.contains(
            "a=fmtp:96 packetization-mode=1;profile-level-id=42001e;sprop-parameter-sets=Z0IAHpU=,aM44gA==\r\n"
        ));
    }

    #[test]
    fn ipv6_destination() {
        let sdp = generate_sdp(&params("::1", None));
        assert!(sdp.contains("c=IN IP6 ::1\r\n"));
        assert!(sdp.contains("o=- 305419896 0 IN IP6 ::1\r\n"));
    }
}
