//! Server operations for MockHcloudClient

use super::{helpers, MockHcloudClient};
use crate::error::HcloudError;
use crate::models::*;
use crate::selector::LabelSelector;

pub async fn list_servers(client: &MockHcloudClient, selector: Option<&LabelSelector>) -> Result<Vec<Server>, HcloudError> {
    Ok(client
        .servers()
        .into_iter()
        .filter(|s| selector.is_none_or(|sel| sel.matches(&s.labels)))
        .collect())
}

pub async fn get_server(client: &MockHcloudClient, id: u64) -> Result<Server, HcloudError> {
    client
        .servers
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .ok_or_else(|| HcloudError::NotFound(format!("Server {} not found", id)))
}

pub async fn get_server_by_name(client: &MockHcloudClient, name: &str) -> Result<Option<Server>, HcloudError> {
    Ok(client
        .servers
        .lock()
        .unwrap()
        .values()
        .find(|s| s.name == name)
        .cloned())
}

pub async fn create_server(
    client: &MockHcloudClient,
    request: &CreateServerRequest,
) -> Result<CreateServerResponse, HcloudError> {
    client.record("create_server", &request.name)?;

    if get_server_by_name(client, &request.name).await?.is_some() {
        return Err(HcloudError::Conflict(format!(
            "uniqueness_error: server name {} is already used",
            request.name
        )));
    }

    let helpers = client.helpers();
    let server = Server {
        id: client.next_id(),
        name: request.name.clone(),
        status: if request.start_after_create { "running" } else { "off" }.to_string(),
        public_net: ServerPublicNet {
            ipv4: Some(IpAddress { ip: helpers.ipv4() }),
            ipv6: None,
        },
        server_type: helpers.named(&request.server_type),
        datacenter: helpers.datacenter(&request.location),
        image: Some(helpers.named(&request.image)),
        labels: request.labels.clone(),
        created: String::new(),
    };
    client.add_server(server.clone());

    Ok(CreateServerResponse {
        server,
        action: helpers.finished_action("create_server"),
        next_actions: Vec::new(),
    })
}

pub async fn delete_server(client: &MockHcloudClient, id: u64) -> Result<Action, HcloudError> {
    client.record("delete_server", &id.to_string())?;
    let helpers = client.helpers();

    if *client.deferred_deletes.lock().unwrap() {
        match client.servers.lock().unwrap().get_mut(&id) {
            Some(server) => server.status = "deleting".to_string(),
            None => return Err(HcloudError::NotFound(format!("Server {} not found", id))),
        }
        let action = helpers.running_action("delete_server");
        client.pending_deletes.lock().unwrap().insert(action.id, id);
        return Ok(action);
    }

    client
        .servers
        .lock()
        .unwrap()
        .remove(&id)
        .map(|_| helpers.finished_action("delete_server"))
        .ok_or_else(|| HcloudError::NotFound(format!("Server {} not found", id)))
}

/// Any polled action is finished; a pending delete removes its server
pub async fn poll_action(client: &MockHcloudClient, id: u64) -> Result<Action, HcloudError> {
    let pending = client.pending_deletes.lock().unwrap().remove(&id);
    if let Some(server_id) = pending {
        client.servers.lock().unwrap().remove(&server_id);
        return Ok(helpers::Helpers::new(id).finished_action("delete_server"));
    }
    Ok(helpers::Helpers::new(id).finished_action("poll"))
}
