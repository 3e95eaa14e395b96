use crate::{
    integrations::mail::Email,
    settings::{MailSettings, RevisitPolicy},
    util::is_blank,
};

use super::attendee::{Attendee, PublicAttendee};

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn sign_off(mail: &MailSettings) -> String {
    format!(
        "Follow <a href='{url}'>{org}</a> to hear about our next events.<br />\
         <br />Hope to see you again soon!<br />\
         <br />The {org} Team",
        url = escape_html(&mail.website_url),
        org = escape_html(&mail.organization_name),
    )
}

fn contact_line(attendee: &Attendee) -> String {
    let mut line = format!(
        "{} {} {}, {}",
        attendee.id,
        escape_html(&attendee.first_name),
        escape_html(&attendee.last_name),
        escape_html(&attendee.email)
    );
    if let Some(phone) = attendee.cell_phone.as_deref().filter(|p| !is_blank(Some(*p))) {
        line.push_str(&format!(", {}", escape_html(phone)));
    }
    line.push_str("<br />");
    line
}

/// Plain text copy of a match form submission.
pub fn confirmation(
    mail: &MailSettings,
    attendee: &Attendee,
    notes: Option<&str>,
    selected: &[PublicAttendee],
) -> Email {
    let mut body = format!(
        "Dear {},\n\nThank you for attending our event. We have received your submission. \
         Below is a copy of the information you provided:",
        attendee.first_name
    );

    if !selected.is_empty() {
        body.push_str("\n\nWho would you like to see again after today?:");
        for person in selected {
            body.push_str(&format!("\n- {} {}", person.id, person.name));
        }
    }

    if let Some(notes) = notes.filter(|n| !is_blank(Some(*n))) {
        body.push_str(&format!("\n\nNotes:\n{}", notes));
    }

    body.push_str(&format!(
        "\n\nThank you once again for participating. You can expect your match results via \
         email within 24 hours.\n\nWith Love,\n{}",
        mail.organization_name
    ));

    Email {
        from: mail.matches_address.clone(),
        to: attendee.email.clone(),
        subject: "Confirmation of Your Match Form Submission".to_owned(),
        body,
        html: false,
    }
}

/// Nudge for an attendee who showed up but has not submitted a match form.
pub fn reminder(mail: &MailSettings, attendee: &Attendee) -> Email {
    let body = format!(
        "Dear {name},<br /><br />Thank you for attending our event! We noticed that we haven't \
         received your match form submission yet. If this was an oversight, please finalize your \
         choices and submit your match form <a href='{url}/match'>here</a>.<br /><br />\
         If you did not find a meaningful connection this time around, don't worry, there will \
         be many more events with tons of different people and possibilities!<br /><br />{sign_off}",
        name = escape_html(&attendee.first_name),
        url = escape_html(mail.website_url.trim_end_matches('/')),
        sign_off = sign_off(mail),
    );

    Email {
        from: mail.matches_address.clone(),
        to: attendee.email.clone(),
        subject: "Last Chance to Submit Your Match Form".to_owned(),
        body,
        html: true,
    }
}

/// Results of one attendee: mutual matches with contact info, and revisits per `policy`.
pub fn results(
    mail: &MailSettings,
    attendee: &Attendee,
    matches: &[Attendee],
    revisits: &[Attendee],
    policy: RevisitPolicy,
    event_label: &str,
) -> Email {
    let shared: Vec<&Attendee> = revisits
        .iter()
        .filter(|r| policy == RevisitPolicy::ShareAll || r.shares_contact())
        .collect();
    let withheld = revisits.len() - shared.len();

    let mut body = format!(
        "Hi {},<br /><br />Thank you so much for attending our event! We hope you had a great time!<br /><br />",
        escape_html(&attendee.first_name)
    );

    if !matches.is_empty() {
        body.push_str("Your mutual matches and their contact information are as follows:<br />");
        for m in matches {
            body.push_str(&contact_line(m));
        }
    }

    if !shared.is_empty() {
        if matches.is_empty() {
            body.push_str(
                "Unfortunately you did not have any mutual matches this time around. However, \
                 you did receive interest from the following attendees who you may want to \
                 revisit a potential connection with:<br />",
            );
        } else {
            body.push_str(
                "<br />You also received interest from the following attendees who you may \
                 want to revisit a potential connection with:<br />",
            );
        }
        for r in &shared {
            body.push_str(&contact_line(r));
        }
        body.push_str(
            "<br />Keep in mind that the people you did not select will not receive your \
             contact information, so if you want to explore those connections you will have \
             to be the one to reach out.<br />",
        );
    }

    if !matches.is_empty() {
        body.push_str("<br />Best of luck exploring your new connections!<br />");
    } else if shared.is_empty() {
        if attendee.interests.ids().is_empty() {
            body.push_str(
                "We are sorry to hear that you didn't find that special spark you were looking \
                 for, but the good news is that there will be many more events with tons of \
                 different people and possibilities!<br />",
            );
        } else {
            body.push_str(
                "Unfortunately you did not have any mutual matches this time around, but there \
                 will be many more events with tons of different people and possibilities!<br />",
            );
        }
    }

    body.push_str("<br />");
    body.push_str(&sign_off(mail));

    if matches.is_empty() && withheld > 0 {
        body.push_str(&format!(
            "<br /><br />P.S. You also received interest from {} {} who opted to not share \
             their contact info with non-mutual matches.",
            withheld,
            if withheld == 1 { "person" } else { "people" }
        ));
    }

    Email {
        from: mail.matches_address.clone(),
        to: attendee.email.clone(),
        subject: format!("{} Matches - {}", mail.organization_name, event_label),
        body,
        html: true,
    }
}

/// Summary of the free-form answers of an event, for the organizers.
pub fn feedback_summary(mail: &MailSettings, roster: &[Attendee], event_label: &str) -> Email {
    let sections: [(&str, fn(&Attendee) -> Option<&str>); 3] = [
        ("Feedback", |a| a.feedback.as_deref()),
        ("Where did you hear about us?", |a| a.referral_info.as_deref()),
        ("Do you have any website feedback?", |a| a.website_feedback.as_deref()),
    ];

    let body = sections
        .iter()
        .map(|(title, field)| {
            let mut section = format!("<u>{}</u>", escape_html(title));
            for attendee in roster {
                if let Some(answer) = field(attendee).filter(|a| !is_blank(Some(*a))) {
                    section.push_str(&format!(
                        "<br />{} {}: {}",
                        escape_html(&attendee.first_name),
                        escape_html(&attendee.last_name),
                        escape_html(answer)
                    ));
                }
            }
            section
        })
        .collect::<Vec<_>>()
        .join("<br /><br />");

    Email {
        from: mail.matches_address.clone(),
        to: mail.contact_address.clone(),
        subject: format!("Event Feedback - {}", event_label),
        body,
        html: true,
    }
}

/// Contact form query forwarded to the organizers.
pub fn contact_query(mail: &MailSettings, name: &str, email: &str, message: &str) -> Email {
    Email {
        from: mail.contact_address.clone(),
        to: mail.contact_address.clone(),
        subject: format!("Contact Query - {}", name),
        body: format!("Message from: {}\nEmail: {}\n\n{}", name, email, message),
        html: false,
    }
}
