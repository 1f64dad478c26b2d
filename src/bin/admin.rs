use std::collections::VecDeque;

use uuid::Uuid;

use vproof_engine::auth::{ApiKeyValidator, Capabilities};
use vproof_engine::crypto::{verify_media_signature, Hash256, MediaSignatureParams};
use vproof_engine::domain::{ProofCode, UserId};

fn print_help() {
    eprintln!(
        "\
vproof-admin

USAGE:
  vproof-admin <command> [options]

COMMANDS:
  gen-key            Generate an API key for a user
  hash-key           Print the storage hash of an API key
  verify-signature   Recompute and check a proof's media signature
  check-code         Check whether a proof code is well-formed

gen-key OPTIONS:
  --user-id <uuid>                (required) User the key acts as
  --label <name>                  (optional) Key label (default: \"admin-cli\")
  --reviewer                      (optional) Grant the reviewer capability
  --service                       (optional) Grant the service capability

hash-key OPTIONS:
  --key <plaintext>               (required) The vp_-prefixed key

verify-signature OPTIONS:
  --media-ref <reference>         (required) Stored media reference
  --result <json|@path>           (required) Interpreted result JSON, inline
                                  or @-prefixed file path
  --issued-at-millis <n>          (required) Issuance instant, epoch millis
  --signature <hex>               (required) Expected signature, 64 hex chars

check-code OPTIONS:
  --code <code>                   (required) Proof code to check
"
    );
}

fn read_result_json(raw: &str) -> anyhow::Result<serde_json::Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => raw.to_string(),
    };
    Ok(serde_json::from_str(&text)?)
}

fn parse_signature(raw: &str) -> anyhow::Result<Hash256> {
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(raw)?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("signature must be 32 bytes"))
}

fn main() -> anyhow::Result<()> {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();
    let Some(command) = args.pop_front() else {
        print_help();
        return Ok(());
    };

    if matches!(command.as_str(), "-h" | "--help" | "help") {
        print_help();
        return Ok(());
    }

    match command.as_str() {
        "gen-key" => {
            let mut user_id: Option<Uuid> = None;
            let mut label = "admin-cli".to_string();
            let mut reviewer = false;
            let mut service = false;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--user-id" => {
                        let raw = args
                            .pop_front()
                            .ok_or_else(|| anyhow::anyhow!("missing value for --user-id"))?;
                        user_id = Some(Uuid::parse_str(&raw)?);
                    }
                    "--label" => {
                        label = args
                            .pop_front()
                            .ok_or_else(|| anyhow::anyhow!("missing value for --label"))?;
                    }
                    "--reviewer" => reviewer = true,
                    "--service" => service = true,
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let user_id = UserId::from_uuid(
                user_id.ok_or_else(|| anyhow::anyhow!("--user-id is required"))?,
            );
            let capabilities = if service {
                Capabilities::service()
            } else if reviewer {
                Capabilities::reviewer()
            } else {
                Capabilities::owner_only()
            };

            let (plaintext, key_hash) = ApiKeyValidator::generate_key(&user_id);
            println!("api_key:   {plaintext}");
            println!("key_hash:  {key_hash}");
            println!("user_id:   {user_id}");
            println!("label:     {label}");
            println!(
                "caps:      reviewer={} service={}",
                capabilities.reviewer, capabilities.service
            );
            println!();
            println!("The plaintext key is shown once; store only the hash.");
            Ok(())
        }
        "hash-key" => {
            let mut key: Option<String> = None;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--key" => {
                        key = Some(
                            args.pop_front()
                                .ok_or_else(|| anyhow::anyhow!("missing value for --key"))?,
                        );
                    }
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let key = key.ok_or_else(|| anyhow::anyhow!("--key is required"))?;
            println!("{}", ApiKeyValidator::hash_key(&key));
            Ok(())
        }
        "verify-signature" => {
            let mut media_ref: Option<String> = None;
            let mut result_raw: Option<String> = None;
            let mut issued_at_millis: Option<i64> = None;
            let mut signature: Option<String> = None;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--media-ref" => {
                        media_ref = Some(
                            args.pop_front()
                                .ok_or_else(|| anyhow::anyhow!("missing value for --media-ref"))?,
                        );
                    }
                    "--result" => {
                        result_raw = Some(
                            args.pop_front()
                                .ok_or_else(|| anyhow::anyhow!("missing value for --result"))?,
                        );
                    }
                    "--issued-at-millis" => {
                        let raw = args.pop_front().ok_or_else(|| {
                            anyhow::anyhow!("missing value for --issued-at-millis")
                        })?;
                        issued_at_millis = Some(raw.parse()?);
                    }
                    "--signature" => {
                        signature = Some(
                            args.pop_front()
                                .ok_or_else(|| anyhow::anyhow!("missing value for --signature"))?,
                        );
                    }
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let media_ref =
                media_ref.ok_or_else(|| anyhow::anyhow!("--media-ref is required"))?;
            let result = read_result_json(
                &result_raw.ok_or_else(|| anyhow::anyhow!("--result is required"))?,
            )?;
            let issued_at_millis =
                issued_at_millis.ok_or_else(|| anyhow::anyhow!("--issued-at-millis is required"))?;
            let expected = parse_signature(
                &signature.ok_or_else(|| anyhow::anyhow!("--signature is required"))?,
            )?;

            let params = MediaSignatureParams {
                media_ref: &media_ref,
                result: &result,
                issued_at_millis,
            };

            if verify_media_signature(&params, &expected) {
                println!("ok: signature matches");
                Ok(())
            } else {
                anyhow::bail!("signature mismatch");
            }
        }
        "check-code" => {
            let mut code: Option<String> = None;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--code" => {
                        code = Some(
                            args.pop_front()
                                .ok_or_else(|| anyhow::anyhow!("missing value for --code"))?,
                        );
                    }
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let code = code.ok_or_else(|| anyhow::anyhow!("--code is required"))?;
            if ProofCode::is_well_formed(&code) {
                println!("ok: well-formed");
                Ok(())
            } else {
                anyhow::bail!("malformed proof code: {code}");
            }
        }
        other => {
            eprintln!("unknown command: {other}\n");
            print_help();
            anyhow::bail!("unknown command: {other}")
        }
    }
}
