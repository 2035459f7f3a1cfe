//! Compiled-template normalization.
//!
//! Some resources carry per-build noise: API deployment resources get a
//! fresh logical-id suffix each compile, and function code keys embed the
//! upload directory. Both are stripped so two compiles of an unchanged
//! service hash identically.

use serde_json::{Map, Value};
use slipway_build::digest::sha256_base64;

const RESOURCES: &str = "Resources";
const PROPERTIES: &str = "Properties";
const API_DEPLOYMENT: &str = "ApiGatewayDeployment";
const WEBSOCKETS_DEPLOYMENT: &str = "WebsocketsDeployment";
const WEBSOCKETS_STAGE: &str = "WebsocketsDeploymentStage";
const FUNCTION_TYPE: &str = "AWS::Lambda::Function";
const LAYER_TYPE: &str = "AWS::Lambda::LayerVersion";

/// Return a copy of `template` with build-variant fields normalized.
pub fn normalize_template(template: &Value) -> Value {
    let mut normalized = template.clone();
    let Some(resources) = normalized
        .get_mut(RESOURCES)
        .and_then(Value::as_object_mut)
    else {
        return normalized;
    };

    let renamed: Map<String, Value> = std::mem::take(resources)
        .into_iter()
        .map(|(id, mut resource)| {
            let id = if id.starts_with(API_DEPLOYMENT) {
                API_DEPLOYMENT.to_owned()
            } else if id.starts_with(WEBSOCKETS_DEPLOYMENT) && id != WEBSOCKETS_STAGE {
                WEBSOCKETS_DEPLOYMENT.to_owned()
            } else {
                id
            };

            if id == WEBSOCKETS_STAGE {
                set_path(
                    &mut resource,
                    &[PROPERTIES, "DeploymentId", "Ref"],
                    WEBSOCKETS_DEPLOYMENT,
                );
            }
            let kind = resource
                .get("Type")
                .and_then(Value::as_str)
                .map(str::to_owned);
            match kind.as_deref() {
                Some(FUNCTION_TYPE) => set_path(&mut resource, &[PROPERTIES, "Code", "S3Key"], ""),
                Some(LAYER_TYPE) => set_path(&mut resource, &[PROPERTIES, "Content", "S3Key"], ""),
                _ => {}
            }
            (id, resource)
        })
        .collect();
    *resources = renamed;
    normalized
}

/// sha256 (base64) of the normalized template serialized with sorted keys.
pub fn template_hash(template: &Value) -> String {
    // serde_json's map is ordered, so serialization is canonical.
    let serialized = normalize_template(template).to_string();
    sha256_base64(serialized.as_bytes())
}

/// Overwrite the string at `path` if every parent along it exists.
fn set_path(value: &mut Value, path: &[&str], replacement: &str) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = value;
    for segment in parents {
        match current.get_mut(*segment) {
            Some(next) => current = next,
            None => return,
        }
    }
    if let Some(object) = current.as_object_mut() {
        object.insert((*last).to_owned(), Value::String(replacement.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template(deployment_id: &str, code_key: &str) -> Value {
        json!({
            "AWSTemplateFormatVersion": "2010-09-09",
            "Resources": {
                deployment_id: {
                    "Type": "AWS::ApiGateway::Deployment",
                    "Properties": { "StageName": "dev" }
                },
                "HelloLambdaFunction": {
                    "Type": "AWS::Lambda::Function",
                    "Properties": {
                        "Code": { "S3Bucket": "deploys", "S3Key": code_key },
                        "Handler": "handler.hello"
                    }
                }
            }
        })
    }

    #[test]
    fn build_noise_does_not_change_hash() {
        let a = template("ApiGatewayDeployment1700000000000", "slipway/api/dev/1/api.zip");
        let b = template("ApiGatewayDeployment1700000099999", "slipway/api/dev/2/api.zip");
        assert_eq!(template_hash(&a), template_hash(&b));
    }

    #[test]
    fn real_changes_change_hash() {
        let a = template("ApiGatewayDeployment1", "k");
        let mut b = a.clone();
        b["Resources"]["HelloLambdaFunction"]["Properties"]["Handler"] = json!("handler.bye");
        assert_ne!(template_hash(&a), template_hash(&b));
    }

    #[test]
    fn websockets_resources_are_renamed() {
        let normalized = normalize_template(&json!({
            "Resources": {
                "WebsocketsDeploymentAbc123": { "Type": "AWS::ApiGatewayV2::Deployment" },
                "WebsocketsDeploymentStage": {
                    "Type": "AWS::ApiGatewayV2::Stage",
                    "Properties": { "DeploymentId": { "Ref": "WebsocketsDeploymentAbc123" } }
                }
            }
        }));

        let resources = normalized["Resources"].as_object().unwrap();
        assert!(resources.contains_key("WebsocketsDeployment"));
        assert!(resources.contains_key("WebsocketsDeploymentStage"));
        assert_eq!(
            normalized["Resources"]["WebsocketsDeploymentStage"]["Properties"]["DeploymentId"]
                ["Ref"],
            "WebsocketsDeployment"
        );
    }

    #[test]
    fn layer_content_key_is_blanked() {
        let normalized = normalize_template(&json!({
            "Resources": {
                "DepsLambdaLayer": {
                    "Type": "AWS::Lambda::LayerVersion",
                    "Properties": { "Content": { "S3Key": "x/deps.zip" } }
                }
            }
        }));
        assert_eq!(
            normalized["Resources"]["DepsLambdaLayer"]["Properties"]["Content"]["S3Key"],
            ""
        );
    }

    #[test]
    fn template_without_resources_is_unchanged() {
        let template = json!({ "Outputs": {} });
        assert_eq!(normalize_template(&template), template);
    }
}
