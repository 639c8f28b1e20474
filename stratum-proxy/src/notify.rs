//! `mining.set` / `mining.notify` payload construction (§4.6), shared by the
//! broadcaster and by the session handler's post-authorize push.

use crate::model::BlockTemplate;

use ii_stratum::{epoch_from_prime_terminus_number, Method, Notification, ServerMessage};

/// Builds the `mining.set` then `mining.notify` pair a session should
/// receive for the given template and its own extranonce.
pub fn job_messages(template: &BlockTemplate, extranonce: &str) -> [ServerMessage; 2] {
    let epoch = epoch_from_prime_terminus_number(template.prime_terminus_number);

    let set_params = serde_json::json!({
        "epoch": format!("{:x}", epoch),
        "target": target_hex(template),
        "algo": "progpow",
        "extranonce": extranonce,
    });
    let set = Notification::new(Method::SET, set_params);

    let notify_params = serde_json::json!([
        format!("{:x}", template.job_id),
        format!("{:x}", template.prime_terminus_number),
        template.custom_seal.to_hex(),
        "0",
    ]);
    let notify = Notification::new(Method::NOTIFY, notify_params);

    [set.into(), notify.into()]
}

fn target_hex(template: &BlockTemplate) -> String {
    let mut bytes = [0u8; 32];
    template.target.to_big_endian(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::SealHash;
    use ii_stratum::U256;

    fn sample_template() -> BlockTemplate {
        BlockTemplate {
            work_object: None,
            target: U256::from(255u64),
            height: [0, 0, 0],
            prime_terminus_number: 60001,
            custom_seal: SealHash([7u8; 32]),
            time: Some(1),
            job_id: 3,
        }
    }

    #[test]
    fn set_message_carries_floor_divided_epoch() {
        let messages = job_messages(&sample_template(), "ab12");
        match &messages[0] {
            ServerMessage::Notification(n) => {
                assert_eq!(n.method, Method::SET);
                assert_eq!(n.params["epoch"], "2");
                assert_eq!(n.params["extranonce"], "ab12");
            }
            _ => panic!("expected notification"),
        }
    }

    #[test]
    fn notify_message_carries_job_id_and_seal_hash() {
        let messages = job_messages(&sample_template(), "ab12");
        match &messages[1] {
            ServerMessage::Notification(n) => {
                assert_eq!(n.method, Method::NOTIFY);
                assert_eq!(n.params[0], "3");
                assert_eq!(n.params[2], sample_template().custom_seal.to_hex());
            }
            _ => panic!("expected notification"),
        }
    }
}
