use std::collections::BTreeMap;

/// Story states that count as the current iteration.
const CURRENT_STATES: &[&str] = &["unstarted", "started", "finished", "delivered", "rejected"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Story {
    pub id: u64,
    pub project_id: u64,
    pub fields: BTreeMap<String, String>,
}

impl Story {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn state(&self) -> &str {
        self.field("current_state").unwrap_or("unscheduled")
    }

    /// Terms are whitespace separated. `key:value` compares a field
    /// (`label:x` matches one entry of the comma-separated `labels`); a bare
    /// word must appear in the name. All terms must match.
    pub fn matches(&self, filter: &str) -> bool {
        filter.split_whitespace().all(|term| match term.split_once(':') {
            Some(("label", wanted)) => self
                .field("labels")
                .unwrap_or_default()
                .split(',')
                .any(|l| l.trim().eq_ignore_ascii_case(wanted)),
            Some(("state", wanted)) => self.state().eq_ignore_ascii_case(wanted),
            Some((key, wanted)) => self
                .field(key)
                .is_some_and(|v| v.eq_ignore_ascii_case(wanted)),
            None => self
                .field("name")
                .unwrap_or_default()
                .to_lowercase()
                .contains(&term.to_lowercase()),
        })
    }
}

#[derive(Clone, Debug)]
pub struct Membership {
    pub id: u64,
    pub email: String,
    pub name: String,
    pub role: String,
}

#[derive(Clone, Debug)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub stories: BTreeMap<u64, Story>,
    pub memberships: Vec<Membership>,
}

/// Iteration groups the service knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Group {
    Done,
    Current,
    Backlog,
}

impl Group {
    pub fn number(self) -> u64 {
        match self {
            Group::Done => 1,
            Group::Current => 2,
            Group::Backlog => 3,
        }
    }

    fn of(story: &Story) -> Group {
        match story.state() {
            "accepted" => Group::Done,
            s if CURRENT_STATES.contains(&s) => Group::Current,
            _ => Group::Backlog,
        }
    }

    /// Groups addressed by a path segment such as `current_backlog`.
    pub fn parse_path(segment: &str) -> Option<Vec<Group>> {
        match segment {
            "done" => Some(vec![Group::Done]),
            "current" => Some(vec![Group::Current]),
            "backlog" => Some(vec![Group::Backlog]),
            "current_backlog" => Some(vec![Group::Current, Group::Backlog]),
            _ => None,
        }
    }
}

impl Project {
    pub fn stories_in(&self, group: Group) -> impl Iterator<Item = &Story> {
        self.stories.values().filter(move |s| Group::of(s) == group)
    }
}

#[derive(Debug, Default)]
pub struct Db {
    projects: BTreeMap<u64, Project>,
    next_id: u64,
}

impl Db {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    pub fn project(&self, id: u64) -> Option<&Project> {
        self.projects.get(&id)
    }

    pub fn create_project(&mut self, name: String, owner: (&str, &str)) -> Project {
        let id = self.next_id();
        let membership = Membership {
            id: self.next_id(),
            email: owner.0.to_string(),
            name: owner.1.to_string(),
            role: "Owner".to_string(),
        };
        let project = Project {
            id,
            name,
            stories: BTreeMap::new(),
            memberships: vec![membership],
        };
        self.projects.insert(id, project.clone());
        project
    }

    pub fn create_story(&mut self, project_id: u64, fields: Vec<(String, String)>) -> Option<Story> {
        if !self.projects.contains_key(&project_id) {
            return None;
        }
        let id = self.next_id();
        let mut story = Story {
            id,
            project_id,
            fields: BTreeMap::from([
                ("story_type".to_string(), "feature".to_string()),
                ("current_state".to_string(), "unscheduled".to_string()),
            ]),
        };
        story.fields.extend(fields);
        let project = self.projects.get_mut(&project_id)?;
        project.stories.insert(id, story.clone());
        Some(story)
    }

    pub fn update_story(
        &mut self,
        project_id: u64,
        story_id: u64,
        fields: Vec<(String, String)>,
    ) -> Option<Story> {
        let story = self
            .projects
            .get_mut(&project_id)?
            .stories
            .get_mut(&story_id)?;
        story.fields.extend(fields);
        Some(story.clone())
    }

    pub fn delete_story(&mut self, project_id: u64, story_id: u64) -> Option<Story> {
        self.projects.get_mut(&project_id)?.stories.remove(&story_id)
    }
}
