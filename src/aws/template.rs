//! Mapping from provisioning requests to EC2 batch templates.

use std::collections::BTreeMap;

use crate::backend::BackendError;
use crate::gateway::{InstanceTemplate, TemplateOptions};
use crate::request::{InstanceCredentials, InstanceOptions, InstanceRequest};

/// Builds the batch template for `request` using `credentials`.
pub(crate) fn build_template(
    request: &InstanceRequest,
    credentials: &InstanceCredentials,
) -> Result<InstanceTemplate, BackendError> {
    let min_ram = request
        .hardware
        .min_ram
        .ok_or_else(|| BackendError::Validation(String::from("hardware.min_ram")))?;
    let min_cores = request
        .hardware
        .min_cores
        .ok_or_else(|| BackendError::Validation(String::from("hardware.min_cores")))?;

    let mut options = match &request.options {
        Some(options) => placement_options(options)?,
        None => TemplateOptions::default(),
    };
    options.login_user = credentials.login_user().map(str::to_owned);
    options.key_pair_name = credentials.key_pair_name().map(str::to_owned);

    Ok(InstanceTemplate {
        image_id: request.image.clone(),
        min_ram,
        min_cores,
        options,
    })
}

fn placement_options(options: &InstanceOptions) -> Result<TemplateOptions, BackendError> {
    let spot_price = options
        .spot_price
        .as_deref()
        .map(str::trim)
        .filter(|price| !price.is_empty())
        .map(|price| {
            price
                .parse::<f32>()
                .map_err(|_| BackendError::Validation(String::from("options.spot_price")))
        })
        .transpose()?;

    let user_metadata: BTreeMap<String, String> = options
        .tags
        .iter()
        .map(|tag| (tag.key.clone(), tag.value.clone()))
        .collect();

    Ok(TemplateOptions {
        spot_price,
        security_group_ids: options.security_group_names.clone(),
        subnet_id: options
            .subnet_id
            .clone()
            .filter(|subnet| !subnet.is_empty()),
        user_metadata,
        ..TemplateOptions::default()
    })
}
