//! Control-plane double serving a fixed machine list.

use std::sync::{Arc, Mutex, PoisonError};

use rigstack::paperspace::{
    AuthSession, ControlPlane, ControlPlaneFuture, Machine, SessionTeam, SessionUser,
};

#[derive(Clone, Debug, Default)]
pub struct StaticControlPlane {
    machines: Arc<Mutex<Vec<Machine>>>,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl StaticControlPlane {
    pub fn add_machine(&self, id: &str, name: &str, public_ip: Option<&str>) {
        self.machines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Machine {
                id: id.to_owned(),
                name: name.to_owned(),
                public_ip: public_ip.map(str::to_owned),
            });
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: &'static str) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl ControlPlane for StaticControlPlane {
    fn auth_session(&self) -> ControlPlaneFuture<'_, AuthSession> {
        self.record("auth_session");
        Box::pin(async {
            Ok(AuthSession {
                user: SessionUser {
                    email: String::from("ops@example.test"),
                },
                team: SessionTeam {
                    id: String::from("team-1"),
                },
            })
        })
    }

    fn list_machines(&self) -> ControlPlaneFuture<'_, Vec<Machine>> {
        self.record("list_machines");
        let machines = self
            .machines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Box::pin(async move { Ok(machines) })
    }
}
